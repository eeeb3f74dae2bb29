use agent_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    agent_stream::init_observability();
    let client = AgentClient::from_env()?;

    let mut run = client
        .thread(ThreadConfig::new())
        .run()
        .user_message("Find waterproof trail shoes under 150.")
        .start_stream()
        .await?;

    let mut printed = String::new();
    while let Some(event) = run.next_event().await {
        match event {
            StreamEvent::Update { update, state, .. } => {
                if let Some(status) = update.thinking_status {
                    eprintln!("[{status}]");
                }
                let text = state.display_text();
                match text.strip_prefix(printed.as_str()) {
                    Some(suffix) => print!("{suffix}"),
                    None => print!("\n{text}"),
                }
                printed = text.to_string();
            }
            StreamEvent::Completed { .. } => println!(),
            StreamEvent::Error { error, .. } => eprintln!("run error: {error}"),
            StreamEvent::RunStarted { .. } | StreamEvent::Payload { .. } => {}
        }
    }

    let state = run.finish().await?;
    if let Some(products) = state.products() {
        eprintln!("{} products", products.len());
    }
    Ok(())
}
