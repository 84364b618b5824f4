use std::fs::File;

use ddna::{ActionHandler, EngineConfig, Event, FileActionStore};

pub fn main() -> ddna::Result<()> {
    // Configure env_logger to see trigger evaluation logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("ddna=debug")).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/data/session-configuration.json".to_owned());
    let configuration: serde_json::Value = serde_json::from_reader(File::open(path)?)?;

    let mut config = EngineConfig::new();
    config
        .multiple_actions(true)
        .action_store(FileActionStore::new(
            std::env::temp_dir().join("ddna-demo-actions.json"),
        ))
        .notifier(|event: Event| {
            println!("Recording event: {}", event.name);
        });
    let engine = config.to_engine();

    engine.configure_session(&configuration)?;

    let outcome = engine
        .record_event(
            Event::new("purchase")
                .put_param("amount", 25)
                .put_param("currency", "USD"),
        )
        .add(ActionHandler::game_parameters(|parameters| {
            println!("Game parameters: {:?}", parameters);
        }))
        .add(ActionHandler::image_message(|message| {
            println!("Image message: {:?}", message.url);
        }))
        .add_evaluate_complete_handler(|event| {
            println!("Evaluated triggers for {}", event.name);
        })
        .run();

    println!("Outcome: {:?}", outcome);

    Ok(())
}
