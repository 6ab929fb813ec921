//! Registered operation types and where each one is delivered.

use std::collections::HashMap;

use fieldsync_domain::constants::DEFAULT_HTTP_METHOD;
use fieldsync_domain::{FieldSyncError, OperationConfig, Result};

const ALLOWED_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

/// Delivery target for one operation type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredOperation {
    pub operation_type: String,
    pub endpoint: String,
    pub module: String,
    pub method: String,
}

/// Startup-validated dispatch table keyed by operation type.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, RegisteredOperation>,
}

impl OperationRegistry {
    /// Build the registry, rejecting empty types, relative endpoints,
    /// unsupported methods and duplicate registrations.
    pub fn from_config(operations: &[OperationConfig]) -> Result<Self> {
        let mut registry = Self::default();
        for op in operations {
            registry.register(RegisteredOperation {
                operation_type: op.operation_type.clone(),
                endpoint: op.endpoint.clone(),
                module: op.module.clone(),
                method: op.method.clone(),
            })?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, mut operation: RegisteredOperation) -> Result<()> {
        let op_type = operation.operation_type.trim().to_string();
        if op_type.is_empty() {
            return Err(FieldSyncError::Config("operation_type must not be empty".to_string()));
        }
        if !operation.endpoint.starts_with('/') {
            return Err(FieldSyncError::Config(format!(
                "endpoint for '{op_type}' must start with '/', got '{}'",
                operation.endpoint
            )));
        }
        if operation.module.trim().is_empty() {
            return Err(FieldSyncError::Config(format!("module for '{op_type}' must not be empty")));
        }

        operation.method = operation.method.trim().to_ascii_uppercase();
        if operation.method.is_empty() {
            operation.method = DEFAULT_HTTP_METHOD.to_string();
        }
        if !ALLOWED_METHODS.contains(&operation.method.as_str()) {
            return Err(FieldSyncError::Config(format!(
                "unsupported method '{}' for '{op_type}'",
                operation.method
            )));
        }

        if self.operations.contains_key(&op_type) {
            return Err(FieldSyncError::Config(format!("operation '{op_type}' registered twice")));
        }
        operation.operation_type = op_type.clone();
        self.operations.insert(op_type, operation);
        Ok(())
    }

    /// Fails fast with `UnknownOperation` for unregistered types.
    pub fn resolve(&self, operation_type: &str) -> Result<&RegisteredOperation> {
        self.operations
            .get(operation_type)
            .ok_or_else(|| FieldSyncError::UnknownOperation(operation_type.to_string()))
    }

    /// Method used on replay; entries queued before a config change fall
    /// back to the default.
    pub fn method_for(&self, operation_type: &str) -> &str {
        self.operations.get(operation_type).map_or(DEFAULT_HTTP_METHOD, |op| op.method.as_str())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(operation_type: &str, endpoint: &str, method: &str) -> OperationConfig {
        OperationConfig {
            operation_type: operation_type.to_string(),
            endpoint: endpoint.to_string(),
            module: "inventory".to_string(),
            method: method.to_string(),
        }
    }

    #[test]
    fn resolves_registered_operations() {
        let registry = OperationRegistry::from_config(&[
            op("submit_stock_count", "/api/stock-counts", "post"),
            op("complete_task", "/api/tasks/complete", "PUT"),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        let resolved = registry.resolve("submit_stock_count").unwrap();
        assert_eq!(resolved.method, "POST");
        assert_eq!(registry.method_for("complete_task"), "PUT");
        assert_eq!(registry.method_for("retired_operation"), "POST");
    }

    #[test]
    fn unknown_operation_fails_fast() {
        let registry = OperationRegistry::default();
        assert!(matches!(
            registry.resolve("log_waste"),
            Err(FieldSyncError::UnknownOperation(name)) if name == "log_waste"
        ));
    }

    #[test]
    fn rejects_invalid_tables() {
        assert!(OperationRegistry::from_config(&[op("", "/x", "POST")]).is_err());
        assert!(OperationRegistry::from_config(&[op("a", "api/x", "POST")]).is_err());
        assert!(OperationRegistry::from_config(&[op("a", "/x", "GET")]).is_err());
        assert!(OperationRegistry::from_config(&[op("a", "/x", "POST"), op("a", "/y", "POST")])
            .is_err());
    }
}
