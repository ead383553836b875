use habit_app::app::{run, AppConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(config.log_filter())
                .unwrap_or_else(|_| EnvFilter::new(habit_app::app::DEFAULT_LOG_FILTER)),
        )
        .init();
    config.report_ignored();
    match run(config).await {
        Ok(rendered) => print!("{rendered}"),
        Err(err) => eprintln!("Failed to show today's habits: {err:#}"),
    }
}
