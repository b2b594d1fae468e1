use axum::http::StatusCode;
use std::net::SocketAddr;

use crate::error::GatewayError;

/// Validates configuration values for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates token bucket parameters
    pub fn validate_rate_limit(capacity: u32, rate_per_sec: u32) -> Result<(), GatewayError> {
        if capacity == 0 {
            return Err(GatewayError::Validation(
                "Bucket capacity must be greater than 0".to_string(),
            ));
        }

        if rate_per_sec == 0 {
            return Err(GatewayError::Validation(
                "Bucket rate must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates the status used for blocked and rate-limited clients
    pub fn validate_reject_status(status: u16) -> Result<StatusCode, GatewayError> {
        let code = StatusCode::from_u16(status).map_err(|_| {
            GatewayError::Validation(format!("Invalid reject status {}", status))
        })?;

        if !(code.is_client_error() || code.is_server_error()) {
            return Err(GatewayError::Validation(format!(
                "Reject status {} must be a 4xx or 5xx code",
                status
            )));
        }

        Ok(code)
    }

    /// Validates the route variable prefix
    pub fn validate_route_prefix(prefix: &str) -> Result<(), GatewayError> {
        if prefix.is_empty() {
            return Err(GatewayError::Validation(
                "Route prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates that the ingress and operator listeners do not collide
    pub fn validate_listeners(ingress: SocketAddr, admin: SocketAddr) -> Result<(), GatewayError> {
        if ingress.port() != 0 && ingress == admin {
            return Err(GatewayError::Validation(format!(
                "Ingress and admin listeners share {}",
                ingress
            )));
        }

        Ok(())
    }
}
