use anyhow::Context;
use clap::Parser;
use fingerprint_serial::adapters::SimulatedDevice;
use fingerprint_serial::core::transport::SystemPorts;
use fingerprint_serial::domain::model::{SlotId, Stage, VerifyStatus};
use fingerprint_serial::domain::ports::{
    ConfigProvider, EnrollmentListener, PortOpener, VerificationListener,
};
use fingerprint_serial::utils::error::ErrorSeverity;
use fingerprint_serial::utils::logger;
use fingerprint_serial::{
    CliConfig, Commands, DeviceSession, FingerprintService, SensorError, Settings,
};
use serde::Serialize;
use std::sync::Arc;

const SIMULATED_PORT: &str = "SIM0";

fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // --json 時 stdout 只留給結果，日誌也改成 JSON
    if cli.json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting fingerprint-serial");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            report_error(&e);
        }
    };

    let runtime = build_runtime(&settings)?;

    match runtime.block_on(run(&cli, settings)) {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => report_error(&e),
    }
}

fn build_runtime(config: &dyn ConfigProvider) -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.worker_threads())
        .build()
        .context("failed to start the async runtime")
}

async fn run(cli: &CliConfig, mut settings: Settings) -> Result<i32, SensorError> {
    let opener: Arc<dyn PortOpener> = if cli.simulate {
        tracing::info!("🧪 Using simulated sensor on {}", SIMULATED_PORT);
        settings.timeouts.stabilization_ms = 0;
        settings.port.get_or_insert_with(|| SIMULATED_PORT.to_string());
        Arc::new(simulated_sensor(&cli.command))
    } else {
        Arc::new(SystemPorts::new(settings.timeouts().open_settle()))
    };

    let session = DeviceSession::from_config(opener, &settings);
    let service = FingerprintService::new(session);

    if let Commands::Ports = cli.command {
        let ports = service.list_ports().await?;
        if cli.json {
            print_json(&ports);
        } else if ports.is_empty() {
            println!("No serial ports found");
        } else {
            for port in &ports {
                let product = port.product.as_deref().unwrap_or("-");
                println!("📟 {:<20} {:<8} {}", port.name, port.port_type, product);
            }
        }
        return Ok(0);
    }

    if let Commands::Clear { yes: false } = cli.command {
        return Err(SensorError::ConfigValidationError {
            field: "clear".to_string(),
            message: "pass --yes to erase every stored template".to_string(),
        });
    }

    let port = settings.require_port()?.to_string();
    if !service.connect(&port).await? {
        return Err(SensorError::NotConnected);
    }

    let code = execute(cli, &service, &port).await;
    service.disconnect().await?;
    code
}

async fn execute(
    cli: &CliConfig,
    service: &FingerprintService,
    port: &str,
) -> Result<i32, SensorError> {
    let json = cli.json;
    match &cli.command {
        Commands::Ports => Ok(0),
        Commands::Ping => {
            let alive = service.ping().await?;
            if json {
                print_json(&serde_json::json!({ "port": port, "alive": alive }));
            } else if alive {
                println!("✅ Sensor on {} is alive", port);
            } else {
                println!("❌ Sensor on {} did not answer", port);
            }
            Ok(if alive { 0 } else { 2 })
        }
        Commands::Count => {
            let templates = service.template_count().await?;
            if json {
                print_json(&serde_json::json!({ "port": port, "templates": templates }));
            } else {
                println!("📊 {} templates stored", templates);
            }
            Ok(0)
        }
        Commands::Enroll { slot } => {
            let slot = SlotId::new(*slot)?;
            let outcome = service
                .start_enrollment(slot.get().into(), ConsoleListener { quiet: json })
                .wait()
                .await?;
            if json {
                print_json(&outcome);
            }
            Ok(if outcome.success { 0 } else { 2 })
        }
        Commands::Verify => {
            let outcome = service
                .start_verification(ConsoleListener { quiet: json })
                .wait()
                .await?;
            if json {
                print_json(&outcome);
            }
            Ok(match outcome.status {
                VerifyStatus::Matched | VerifyStatus::NotFound => 0,
                VerifyStatus::Failed => 2,
            })
        }
        Commands::Delete { slot } => {
            let slot = SlotId::new(*slot)?;
            let deleted = service.delete_template(slot.get().into()).await?;
            acknowledged(json, "delete", deleted, &format!("Template {} deleted", slot))
        }
        Commands::Clear { .. } => {
            let cleared = service.clear_all_templates().await?;
            acknowledged(json, "clear", cleared, "All templates erased")
        }
        Commands::Test => {
            let passed = service.self_test().await?;
            acknowledged(json, "test", passed, "Self-test passed")
        }
        Commands::Diagnose => {
            let report = DiagnoseReport {
                port: port.to_string(),
                connected: service.is_connected(),
                templates: service.template_count().await?,
                self_test: service.self_test().await?,
                alive_after_test: service.ping().await?,
            };
            if json {
                print_json(&report);
            } else {
                report.print();
            }
            Ok(if report.passed() { 0 } else { 2 })
        }
    }
}

fn acknowledged(json: bool, action: &str, ok: bool, message: &str) -> Result<i32, SensorError> {
    if json {
        print_json(&serde_json::json!({ "action": action, "acknowledged": ok }));
    } else if ok {
        println!("✅ {}", message);
    } else {
        println!("❌ Sensor did not acknowledge {}", action);
    }
    Ok(if ok { 0 } else { 2 })
}

#[derive(Debug, Serialize)]
struct DiagnoseReport {
    port: String,
    connected: bool,
    templates: u32,
    self_test: bool,
    alive_after_test: bool,
}

impl DiagnoseReport {
    fn passed(&self) -> bool {
        self.connected && self.self_test && self.alive_after_test
    }

    fn print(&self) {
        let mark = |ok: bool| if ok { "✅" } else { "❌" };
        println!("🔍 Sensor diagnostics for {}", self.port);
        println!("  {} connection", mark(self.connected));
        println!("  📊 {} templates stored", self.templates);
        println!("  {} self-test", mark(self.self_test));
        println!("  {} responsive after self-test", mark(self.alive_after_test));
    }
}

/// Prints progress for the interactive CLI; silent under --json.
struct ConsoleListener {
    quiet: bool,
}

impl EnrollmentListener for ConsoleListener {
    fn on_progress(&mut self, _stage: &Stage, message: &str) {
        if !self.quiet {
            println!("👉 {}", message);
        }
    }

    fn on_success(&mut self, slot: SlotId) {
        if !self.quiet {
            println!("✅ Fingerprint stored in slot {}", slot);
        }
    }

    fn on_error(&mut self, error: &SensorError) {
        if !self.quiet {
            eprintln!("❌ {}", error.user_friendly_message());
        }
    }
}

impl VerificationListener for ConsoleListener {
    fn on_progress(&mut self, _stage: &Stage, message: &str) {
        if !self.quiet {
            println!("👉 {}", message);
        }
    }

    fn on_success(&mut self, slot: SlotId, confidence: u16) {
        if !self.quiet {
            println!("✅ Match in slot {} (confidence {})", slot, confidence);
        }
    }

    fn on_not_found(&mut self) {
        if !self.quiet {
            println!("🚫 Fingerprint not registered");
        }
    }

    fn on_error(&mut self, error: &SensorError) {
        if !self.quiet {
            eprintln!("❌ {}", error.user_friendly_message());
        }
    }
}

/// Scripted sensor for --simulate: stores into the requested slot and matches slot 1.
fn simulated_sensor(command: &Commands) -> SimulatedDevice {
    let device = SimulatedDevice::new(SIMULATED_PORT);
    device.respond("COUNT", &["COUNT:3"]);
    device.respond("TEST", &["TEST:OK"]);
    device.respond("CLEAR", &["CLEAR:OK"]);
    device.respond(
        "VERIFY",
        &["PLACE_FINGER", "CAPTURED", "FOUND:1", "VERIFY:OK:1:1:180"],
    );

    match command {
        Commands::Enroll { slot } => {
            let ok = format!("ENROLL:OK:1:{}", slot);
            device.respond(
                &format!("ENROLL:{}", slot),
                &[
                    "PLACE_FINGER",
                    "CAPTURED",
                    "REMOVE_FINGER",
                    "PLACE_AGAIN",
                    "CREATING_MODEL",
                    "SAVING",
                    ok.as_str(),
                ],
            );
        }
        Commands::Delete { slot } => {
            let ok = format!("DELETE:OK:{}", slot);
            device.respond(&format!("DELETE:{}", slot), &[ok.as_str()]);
        }
        _ => {}
    }
    device
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::error!("Failed to serialize result: {}", e),
    }
}

fn report_error(e: &SensorError) -> ! {
    tracing::error!(
        "❌ Operation failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    // 依錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}
