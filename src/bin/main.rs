use std::{
    error::Error,
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pulsewatch::{
    cli::{Cli, Commands, ControlArgs, parse_args},
    config::{load_config, parse_duration},
    control::{ControlCommand, ControlResponse},
    heartbeat::HeartbeatWriter,
    ipc::{self, ControlError, ControlRequest},
    notify::TokenStatus,
    supervisor::{LoopEvent, Supervisor, TickReport, listen},
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    match args.command {
        Commands::Run { config } => run_foreground(&config)?,
        Commands::Check { config } => run_check(&config)?,
        Commands::Status(control) => send_control_command(&control, ControlCommand::Status)?,
        Commands::Toggle(control) => send_control_command(&control, ControlCommand::Toggle)?,
        Commands::Restart { control, reason } => {
            send_control_command(&control, ControlCommand::Restart { reason })?
        }
        Commands::Panel(control) => send_control_command(&control, ControlCommand::Panel)?,
        Commands::Beat {
            path,
            interval,
            once,
            timezone,
        } => run_beat(&path, &interval, once, &timezone)?,
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_foreground(config_path: &str) -> Result<(), Box<dyn Error>> {
    let settings = load_config(Some(config_path))?;
    let socket = settings.control.socket.clone();
    let mut supervisor = Supervisor::new(settings)?;

    let (events_tx, events_rx) = mpsc::channel();

    let listening = match listen(&socket, events_tx.clone()) {
        Ok(_) => true,
        Err(err) => {
            warn!("Control socket unavailable at {:?}: {err}", socket);
            false
        }
    };

    let shutdown_tx = events_tx;
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(LoopEvent::Shutdown);
    })?;

    supervisor.run(events_rx);
    if listening {
        ipc::cleanup(&socket);
    }
    Ok(())
}

fn run_check(config_path: &str) -> Result<(), Box<dyn Error>> {
    let settings = load_config(Some(config_path))?;
    let mut supervisor = Supervisor::new(settings)?;
    let report = supervisor.tick_at(Utc::now());
    print_report(&report);
    Ok(())
}

fn print_report(report: &TickReport) {
    if let Some(tick) = &report.heartbeat {
        println!(
            "service: {}\nheartbeat: {} (idle {:.1} min)",
            tick.state, tick.liveness.reason, tick.liveness.idle_minutes
        );
        if let Some(decision) = &tick.restart {
            println!("restart: {decision:?}");
        }
    }
    if let Some(token) = &report.token {
        match &token.status {
            TokenStatus::Valid { account } => println!("token: ok ({account})"),
            TokenStatus::Invalid { reason } => println!("token: {reason}"),
        }
        if let Some(decision) = &token.restart {
            println!("restart: {decision:?}");
        }
    }
    if let Some(cleanup) = &report.cleanup {
        println!("disk: {} -> {}", cleanup.before, cleanup.after);
    }
    for (task, err) in &report.failures {
        println!("{task} check failed: {err}");
    }
}

fn control_socket(args: &ControlArgs) -> Result<PathBuf, Box<dyn Error>> {
    match &args.socket {
        Some(socket) => Ok(PathBuf::from(socket)),
        None => Ok(load_config(Some(&args.config))?.control.socket),
    }
}

fn send_control_command(args: &ControlArgs, command: ControlCommand) -> Result<(), Box<dyn Error>> {
    let socket = control_socket(args)?;

    match ipc::send_request(&socket, &ControlRequest { command }) {
        Ok(ControlResponse::Message(message)) => {
            println!("{message}");
            Ok(())
        }
        Ok(ControlResponse::Ok) => Ok(()),
        Ok(ControlResponse::Error(message)) => Err(ControlError::Server(message).into()),
        Err(ControlError::NotAvailable) => {
            Err(format!("no running pulsewatch watchdog at {}", socket.display()).into())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_beat(path: &str, interval: &str, once: bool, timezone: &str) -> Result<(), Box<dyn Error>> {
    let interval = parse_duration(interval)?;
    let timezone: Tz = timezone
        .parse()
        .map_err(|err| format!("invalid timezone '{timezone}': {err}"))?;
    let writer = HeartbeatWriter::new(Path::new(path).to_path_buf(), timezone);

    loop {
        match writer.beat() {
            Ok(at) => info!("Heartbeat written at {at}"),
            Err(err) if once => return Err(err.into()),
            Err(err) => warn!("Failed to write heartbeat to {path}: {err}"),
        }
        if once {
            return Ok(());
        }
        thread::sleep(interval);
    }
}
