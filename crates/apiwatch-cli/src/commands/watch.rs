use crate::headers;
use anyhow::{Context, Result};
use apiwatch_browser::{BrowserSession, SessionConfig, TrafficMonitor};
use apiwatch_core::aggregate::ErrorSummary;
use apiwatch_core::report::ReportWriter;
use apiwatch_server::ApiState;
use chrono::Local;
use console::style;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};

pub struct WatchOpts {
    pub url: Option<String>,
    pub user_data_dir: Option<PathBuf>,
    pub config: PathBuf,
    pub web_port: u16,
    pub no_web: bool,
    pub output_dir: PathBuf,
    pub headless: bool,
}

/// Launch the browser, monitor its API traffic until the operator stops
/// it (Ctrl+C or closing the window), then write the report.
pub async fn execute(opts: WatchOpts) -> Result<()> {
    let extra_headers = headers::load(&opts.config)?;
    if !extra_headers.is_empty() {
        println!(
            "Loaded {} extra headers from {}",
            extra_headers.len(),
            opts.config.display()
        );
    }

    std::fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("failed to create {}", opts.output_dir.display()))?;
    let output_file = opts
        .output_dir
        .join(format!("{}.txt", Local::now().format("%Y%m%d%H%M%S")));

    let summary = Arc::new(Mutex::new(ErrorSummary::new()));

    let (session, log) = BrowserSession::launch(SessionConfig {
        initial_url: opts.url,
        user_data_dir: opts.user_data_dir,
        headless: opts.headless,
        extra_headers,
    })
    .await
    .context("failed to launch the browser session")?;

    if !opts.no_web {
        let state = ApiState {
            summary: Arc::clone(&summary),
            output_file: output_file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        };
        let addr: SocketAddr = ([127, 0, 0, 1], opts.web_port).into();
        tokio::spawn(async move {
            if let Err(e) = apiwatch_server::serve(state, addr).await {
                tracing::error!("query server stopped: {e}");
            }
        });
        println!(
            "{} http://127.0.0.1:{}",
            style("Statistics dashboard:").green().bold(),
            opts.web_port
        );
    }

    println!();
    println!("Monitoring started; drive the site in the browser window.");
    println!(
        "Press {} to stop monitoring and write the final report.",
        style("Ctrl+C").yellow()
    );
    println!();

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            println!("🛑 Stopping monitor...");
            let _ = stop_tx.send(());
        }
    });

    let monitor = TrafficMonitor::new(session, log, Arc::clone(&summary));
    let session = monitor.run(stop_rx).await;

    // The aggregate has to reach the report before the browser is
    // released.
    {
        let summary = summary.lock().await;
        ReportWriter::to_file(&summary, &output_file)
            .with_context(|| format!("failed to write {}", output_file.display()))?;
        println!();
        print!("{}", ReportWriter::render(&summary));
    }
    println!(
        "{} {}",
        style("Report saved to").green(),
        output_file.display()
    );

    session.close().await;
    Ok(())
}
