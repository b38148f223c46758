use super::ProxyController;
use crate::config::ProxyConfig;
use crate::error::{FleetError, Result};
use crate::tenant::Tenant;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{info, warn};

const SECURITY_HEADERS: &str = "    header {
        X-Content-Type-Options \"nosniff\"
        X-Frame-Options \"SAMEORIGIN\"
        -Server
    }
";

/// Render a Caddyfile routing the dashboard and every tenant
pub fn render_caddyfile(proxy: &ProxyConfig, tenants: &[Tenant]) -> String {
    let scheme = if proxy.enable_https { "https" } else { "http" };
    let mut out = String::new();

    if proxy.enable_https {
        let _ = write!(
            out,
            "{{\n    email {}\n    storage file_system {{\n        root /data\n    }}\n}}\n",
            proxy.acme_email
        );
    } else {
        out.push_str("{\n    auto_https off\n}\n");
    }

    let _ = write!(
        out,
        "\n# Dashboard\n{}://dashboard.{} {{\n{}    reverse_proxy localhost:{}\n}}\n",
        scheme, proxy.domain_name, SECURITY_HEADERS, proxy.api_port
    );

    out.push_str("\n# Tenant instances\n");
    for tenant in tenants {
        let _ = write!(
            out,
            "\n{}://{}.{} {{\n{}    reverse_proxy localhost:{}\n}}\n",
            scheme, tenant.subdomain, proxy.domain_name, SECURITY_HEADERS, tenant.port
        );
    }

    out
}

/// Reloads a Caddy server from a generated Caddyfile
#[derive(Debug, Clone)]
pub struct CaddyController {
    config: ProxyConfig,
}

impl CaddyController {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    /// Write the Caddyfile atomically (temp file + rename)
    pub async fn write_config(&self, tenants: &[Tenant]) -> Result<()> {
        let path = &self.config.caddyfile;
        let contents = render_caddyfile(&self.config, tenants);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FleetError::Proxy(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents)
            .await
            .map_err(|e| FleetError::Proxy(format!("Failed to write Caddyfile: {}", e)))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| FleetError::Proxy(format!("Failed to install Caddyfile: {}", e)))?;

        Ok(())
    }

    /// Launch `caddy run` on the current Caddyfile
    pub fn spawn_server(&self) -> Result<Child> {
        let child = self
            .command("run")
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FleetError::Proxy(format!("Failed to start Caddy: {}", e)))?;

        info!(pid = ?child.id(), "Caddy started");
        Ok(child)
    }

    fn command(&self, action: &str) -> Command {
        let mut command = Command::new(&self.config.caddy_binary);
        command
            .arg(action)
            .arg("--config")
            .arg(&self.config.caddyfile)
            .args(["--adapter", "caddyfile"]);
        command
    }
}

#[async_trait]
impl ProxyController for CaddyController {
    async fn reload(&self, tenants: &[Tenant]) -> Result<()> {
        self.write_config(tenants).await?;

        let output = self
            .command("reload")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FleetError::Proxy(format!("Failed to run caddy reload: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "caddy reload failed");
            return Err(FleetError::Proxy(format!(
                "caddy reload exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        info!(tenants = tenants.len(), "Caddy configuration reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn tenant(subdomain: &str, port: u16) -> Tenant {
        Tenant::new(
            subdomain.to_string(),
            subdomain.to_string(),
            subdomain.to_string(),
            port,
            PathBuf::from("/tmp").join(subdomain),
        )
    }

    #[test]
    fn test_render_http() {
        let proxy = ProxyConfig {
            domain_name: "example.com".to_string(),
            api_port: 9000,
            ..ProxyConfig::default()
        };

        let rendered = render_caddyfile(&proxy, &[tenant("acme", 8081), tenant("globex", 8082)]);

        assert!(rendered.starts_with("{\n    auto_https off\n}\n"));
        assert!(rendered.contains("http://dashboard.example.com {"));
        assert!(rendered.contains("reverse_proxy localhost:9000"));
        assert!(rendered.contains("http://acme.example.com {"));
        assert!(rendered.contains("reverse_proxy localhost:8081"));
        assert!(rendered.contains("http://globex.example.com {"));
        assert!(rendered.contains("reverse_proxy localhost:8082"));
        assert_eq!(rendered.matches("X-Frame-Options \"SAMEORIGIN\"").count(), 3);
    }

    #[test]
    fn test_render_https_sets_email() {
        let proxy = ProxyConfig {
            enable_https: true,
            acme_email: "ops@example.com".to_string(),
            domain_name: "example.com".to_string(),
            ..ProxyConfig::default()
        };

        let rendered = render_caddyfile(&proxy, &[tenant("acme", 8081)]);

        assert!(rendered.contains("email ops@example.com"));
        assert!(!rendered.contains("auto_https off"));
        assert!(rendered.contains("https://acme.example.com {"));
    }

    #[tokio::test]
    async fn test_write_config_replaces_file() {
        let temp_dir = TempDir::new().unwrap();
        let caddyfile = temp_dir.path().join("conf").join("Caddyfile");
        let controller = CaddyController::new(ProxyConfig {
            caddyfile: caddyfile.clone(),
            ..ProxyConfig::default()
        });

        controller.write_config(&[tenant("acme", 8081)]).await.unwrap();
        controller.write_config(&[]).await.unwrap();

        let contents = std::fs::read_to_string(&caddyfile).unwrap();
        assert!(!contents.contains("acme"));
        assert!(!caddyfile.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_reload_reports_failing_binary() {
        let temp_dir = TempDir::new().unwrap();
        let controller = CaddyController::new(ProxyConfig {
            caddyfile: temp_dir.path().join("Caddyfile"),
            caddy_binary: PathBuf::from("/bin/false"),
            ..ProxyConfig::default()
        });

        let result = controller.reload(&[tenant("acme", 8081)]).await;
        assert!(matches!(result, Err(FleetError::Proxy(_))));
        // The config is still written before the reload attempt
        assert!(temp_dir.path().join("Caddyfile").exists());
    }
}
