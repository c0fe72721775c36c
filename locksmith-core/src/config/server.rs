//! Listener and TLS configuration

use anyhow::{bail, Result};
use std::env;

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server listening port
    /// Env: PORT
    /// Default: 9000
    pub port: u16,

    /// Terminate TLS on the listener
    /// Env: TLS
    /// Default: false
    pub tls: bool,

    /// Path to the server certificate PEM file
    /// Env: TLS_CERT_PATH
    /// Default: None (required when TLS is enabled)
    pub tls_cert_path: Option<String>,

    /// Path to the server private key PEM file
    /// Env: TLS_KEY_PATH
    /// Default: None (required when TLS is enabled)
    pub tls_key_path: Option<String>,

    /// Require and verify client certificates (mTLS)
    /// Env: TLS_REQUIRE_CLIENT_CERT
    /// Default: false
    pub tls_require_client_cert: bool,

    /// Path to the CA certificate PEM used to verify client certificates
    /// Env: TLS_CLIENT_CA_CERT_PATH
    /// Default: None (required when client certs are required)
    pub tls_client_ca_cert_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9000,
            tls: false,
            tls_cert_path: None,
            tls_key_path: None,
            tls_require_client_cert: false,
            tls_client_ca_cert_path: None,
        }
    }
}

impl ServerConfig {
    /// Apply environment variables
    pub fn apply_env_vars(&mut self) {
        if let Ok(port) = env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }

        if let Ok(tls) = env::var("TLS") {
            self.tls = tls.parse().unwrap_or(false);
        }

        if let Ok(cert) = env::var("TLS_CERT_PATH") {
            self.tls_cert_path = Some(cert);
        }

        if let Ok(key) = env::var("TLS_KEY_PATH") {
            self.tls_key_path = Some(key);
        }

        if let Ok(require) = env::var("TLS_REQUIRE_CLIENT_CERT") {
            self.tls_require_client_cert = require.parse().unwrap_or(false);
        }

        if let Ok(ca) = env::var("TLS_CLIENT_CA_CERT_PATH") {
            self.tls_client_ca_cert_path = Some(ca);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.tls {
            return Ok(());
        }

        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => {
                if !std::path::Path::new(cert).exists() {
                    bail!("TLS certificate file not found: {}", cert);
                }
                if !std::path::Path::new(key).exists() {
                    bail!("TLS key file not found: {}", key);
                }
            }
            (Some(_), None) => {
                bail!("TLS is enabled but TLS_KEY_PATH is missing");
            }
            (None, _) => {
                bail!("TLS is enabled but TLS_CERT_PATH is missing");
            }
        }

        if self.tls_require_client_cert {
            match &self.tls_client_ca_cert_path {
                Some(ca) => {
                    if !std::path::Path::new(ca).exists() {
                        bail!("TLS client CA certificate file not found: {}", ca);
                    }
                }
                None => {
                    bail!(
                        "TLS_REQUIRE_CLIENT_CERT is set but TLS_CLIENT_CA_CERT_PATH is missing"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_tls() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 9000);
        assert!(!cfg.tls);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_tls_without_cert_fails() {
        let cfg = ServerConfig { tls: true, ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("TLS_CERT_PATH is missing"));
    }

    #[test]
    fn test_tls_cert_without_key_fails() {
        let cfg = ServerConfig {
            tls: true,
            tls_cert_path: Some("cert.pem".to_string()),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("TLS_KEY_PATH is missing"));
    }

    #[test]
    fn test_tls_cert_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");

        let cfg = ServerConfig {
            tls: true,
            tls_cert_path: Some(cert_path.to_str().unwrap().to_string()),
            tls_key_path: Some(key_path.to_str().unwrap().to_string()),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_tls_both_files_exist() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, "fake cert").unwrap();
        std::fs::write(&key_path, "fake key").unwrap();

        let cfg = ServerConfig {
            tls: true,
            tls_cert_path: Some(cert_path.to_str().unwrap().to_string()),
            tls_key_path: Some(key_path.to_str().unwrap().to_string()),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_client_certs_need_a_ca_pool() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, "fake cert").unwrap();
        std::fs::write(&key_path, "fake key").unwrap();

        let cfg = ServerConfig {
            tls: true,
            tls_cert_path: Some(cert_path.to_str().unwrap().to_string()),
            tls_key_path: Some(key_path.to_str().unwrap().to_string()),
            tls_require_client_cert: true,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("TLS_CLIENT_CA_CERT_PATH is missing"));
    }

    #[test]
    fn test_apply_env_vars_port() {
        let mut cfg = ServerConfig::default();
        std::env::set_var("PORT", "12345");
        cfg.apply_env_vars();
        assert_eq!(cfg.port, 12345);
        std::env::remove_var("PORT");
    }
}
