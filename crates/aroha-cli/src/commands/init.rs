use aroha_core::{ConversationStore, SecretSource};

use crate::app::AppContext;

pub fn handle_init(ctx: &AppContext) -> anyhow::Result<()> {
    let config = ctx.store_config()?;
    let db_path = config.db_path.clone();
    let key_file = config.key_file.clone();
    let existed = db_path.exists();

    let store = ConversationStore::open(config)?;
    store.unlock()?;

    if ctx.quiet() {
        return Ok(());
    }

    if existed {
        println!("Conversation store already exists at {}", db_path.display());
    } else {
        println!("Initialized conversation store at {}", db_path.display());
    }

    let header = store.header();
    println!("- format: v{} ({})", header.format_version, header.cipher);
    println!(
        "- key derivation: {} ({} iterations, {} KiB)",
        header.kdf, header.kdf_iterations, header.kdf_memory_kib
    );
    match store.secret_source() {
        SecretSource::Configured => println!("- master secret: ENCRYPTION_KEY"),
        SecretSource::KeyFile => println!("- master secret: {}", key_file.display()),
        SecretSource::Generated => {
            println!("- master secret: generated into {}", key_file.display());
            println!("Hint: Back up the key file. Without it the store cannot be read.");
        }
    }
    Ok(())
}
