//! Management API Types

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: SystemTime::now(),
        }
    }
}

/// Health check result
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub storage: String,
    pub active_connections: usize,
}

/// Server status information
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerStatus {
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub total_connections: u64,
    pub messages_relayed: u64,
    pub evictions: u64,
    pub persistence_failures: u64,
    pub version: String,
}
