pub mod bot;
pub mod config;
pub mod crawler;
pub mod declare;
pub mod event;
pub mod logging;
pub mod report;
pub mod util;

use crate::{config::App, event::stock_report, logging::Logger};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let logger = Logger::from_env();
    logger.info("--- Stock Fetcher Script Started ---".to_string());

    let app = App::load(&logger);
    logger.debug(format!("Loaded configuration: {:?}", app));

    if let Err(why) = stock_report::execute(&app, &logger).await {
        logger.critical(format!("Failed to run the stock report because {:?}", why));
    }

    logger.info("--- Stock Fetcher Script Finished ---".to_string());
}
