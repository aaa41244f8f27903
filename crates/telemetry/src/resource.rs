//! Resource attributes identifying this process.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{SERVICE_INSTANCE_ID, SERVICE_NAME};
use uuid::Uuid;

/// Service name plus a per-process random instance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service_name: String,
    pub instance_id: String,
}

impl ServiceIdentity {
    /// Generate a fresh identity. Every call yields a new instance id.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// SDK default attributes (`telemetry.sdk.*`, `OTEL_RESOURCE_ATTRIBUTES`)
    /// extended with this identity. The identity wins on key conflicts.
    pub fn to_resource(&self) -> Resource {
        Resource::default().merge(&Resource::new([
            KeyValue::new(SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(SERVICE_INSTANCE_ID, self.instance_id.clone()),
        ]))
    }
}
