// Output formatting and display for CLI

use crate::ipc::protocol::ResponseData;
use crate::tenant::{TenantStatus, TenantStatusReport};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print a success response to stdout
pub fn print_success(data: &ResponseData) {
    match data {
        ResponseData::Created(created) => {
            let tenant = &created.tenant;
            println!("{}", "✓ Tenant created".green().bold());
            println!("  {:<12} {}", "ID:".bold(), tenant.id.cyan());
            println!("  {:<12} {}", "Name:".bold(), tenant.name);
            println!("  {:<12} {}", "Port:".bold(), tenant.port);
            println!("  {:<12} {}", "Status:".bold(), format_status_colored(tenant.status));
            if let Some(url) = &created.setup_url {
                println!("  {:<12} {}", "Setup:".bold(), url.underline());
            }
        }

        ResponseData::Started { id } => print_done(&format!("Tenant {} started", id)),
        ResponseData::Stopped { id } => print_done(&format!("Tenant {} stopped", id)),
        ResponseData::Restarted { id } => print_done(&format!("Tenant {} restarted", id)),
        ResponseData::Deleted { id } => print_done(&format!("Tenant {} deleted", id)),

        ResponseData::Status(report) => print_detailed_status(report),

        ResponseData::TenantList(reports) => {
            if reports.is_empty() {
                println!("{}", "No tenants".yellow());
            } else {
                print_tenant_table(reports);
            }
        }

        ResponseData::Logs(lines) => print_logs(lines),

        ResponseData::Pong {
            version,
            uptime_secs,
            running,
        } => {
            println!("{}", "✓ Daemon is running".green().bold());
            println!("  {:<12} {}", "Version:".bold(), version);
            println!(
                "  {:<12} {}",
                "Uptime:".bold(),
                format_duration(Duration::from_secs(*uptime_secs))
            );
            println!("  {:<12} {}", "Running:".bold(), running);
        }
    }
}

fn print_done(message: &str) {
    println!("{}", format!("✓ {}", message).green().bold());
}

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

fn print_tenant_table(reports: &[TenantStatusReport]) {
    #[derive(Tabled)]
    struct TenantRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Port")]
        port: u16,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Memory")]
        memory: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "URL")]
        url: String,
    }

    let rows: Vec<TenantRow> = reports
        .iter()
        .map(|r| TenantRow {
            id: truncate(&r.id, 24),
            status: format_status_colored(r.status),
            port: r.port,
            pid: or_dash(r.pid),
            cpu: r
                .cpu_percent
                .map(|cpu| format!("{:.1}%", cpu))
                .unwrap_or_else(|| "-".to_string()),
            memory: r
                .memory_bytes
                .map(format_memory)
                .unwrap_or_else(|| "-".to_string()),
            uptime: r
                .uptime_secs
                .map(|secs| format_duration(Duration::from_secs(secs)))
                .unwrap_or_else(|| "-".to_string()),
            url: r.public_url.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);

    let running = reports
        .iter()
        .filter(|r| r.status == TenantStatus::Running)
        .count();
    println!(
        "{}",
        format!("Total: {} tenant(s), {} running", reports.len(), running)
            .dimmed()
            .italic()
    );
}

/// Print detailed status view for a single tenant
fn print_detailed_status(report: &TenantStatusReport) {
    println!("\n{}", "Tenant Details".bold().underline());
    println!();
    println!("  {:<15} {}", "ID:".bold(), report.id.cyan());
    println!("  {:<15} {}", "Subdomain:".bold(), report.subdomain);
    println!("  {:<15} {}", "Status:".bold(), format_status_colored(report.status));
    println!("  {:<15} {}", "Port:".bold(), report.port);
    println!("  {:<15} {}", "PID:".bold(), or_dash(report.pid));

    if let Some(secs) = report.uptime_secs {
        println!(
            "  {:<15} {}",
            "Uptime:".bold(),
            format_duration(Duration::from_secs(secs))
        );
    }
    if let Some(cpu) = report.cpu_percent {
        println!("  {:<15} {:.1}%", "CPU Usage:".bold(), cpu);
    }
    if let Some(bytes) = report.memory_bytes {
        println!("  {:<15} {}", "Memory:".bold(), format_memory(bytes));
    }

    println!("  {:<15} {}", "Public URL:".bold(), report.public_url);
    println!("  {:<15} {}", "Admin URL:".bold(), report.admin_url);
    println!();
}

/// Print log lines, dimming supervisor markers
fn print_logs(lines: &[String]) {
    if lines.is_empty() {
        println!("{}", "No logs available".yellow());
        return;
    }

    for line in lines {
        if line.starts_with(crate::logs::MARKER_PREFIX) {
            println!("{}", line.dimmed());
        } else {
            println!("{}", line);
        }
    }
}

/// Format a tenant status with color coding
fn format_status_colored(status: TenantStatus) -> String {
    match status {
        TenantStatus::Running => status.to_string().green().to_string(),
        TenantStatus::Stopped => status.to_string().bright_black().to_string(),
        TenantStatus::Error => status.to_string().red().bold().to_string(),
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format a duration in human-readable format
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let (mins, secs) = (secs / 60, secs % 60);
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else if secs < 86400 {
        let (hours, mins) = (secs / 3600, (secs % 3600) / 60);
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let (days, hours) = (secs / 86400, (secs % 86400) / 3600);
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Format memory usage in human-readable format
fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    }
}

/// Truncate a string to at most `max_len` characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Spinner shown while the daemon works on a request
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
