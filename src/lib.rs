pub mod cli;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use cli::Args;
use history::initialize_history_store;
use log::info;
use server::api::AppState;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let chat_client = llm::chat::new_client(&args.llm_config())?;

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat Model: {}", chat_client.get_model());
    info!("Chat Endpoint: {}", chat_client.get_base_url());
    info!("System Prompt: {}", args.system_prompt);
    info!("TLS Enabled: {}", args.tls_paths().is_some());
    info!("-------------------------");

    let history = initialize_history_store();
    let state = AppState::new(history, chat_client, &args.system_prompt);

    let server = Server::new(args.server_addr.clone(), state, args.clone());
    server.run().await?;

    Ok(())
}
