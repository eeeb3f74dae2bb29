use agent_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    let client = AgentClient::from_env()?;

    let state = client
        .thread(ThreadConfig::new())
        .run()
        .user_message("Say hello.")
        .collect_state()
        .await?;

    println!("{}", state.display_text());
    for call in state.tool_calls() {
        println!("tool {} -> {:?}", call.name, call.status);
    }
    Ok(())
}
