use aroha_core::config::ENV_ENCRYPTION_KEY;
use aroha_core::crypto::generate_secret;
use aroha_core::crypto::secret::write_env_secret;
use secrecy::ExposeSecret;

use crate::app::AppContext;
use crate::cli::KeygenArgs;

pub fn handle_keygen(ctx: &AppContext, args: &KeygenArgs) -> anyhow::Result<()> {
    let secret = generate_secret()?;

    match &args.env_file {
        Some(path) => {
            write_env_secret(path, &secret)?;
            if !ctx.quiet() {
                println!("Wrote {} to {}", ENV_ENCRYPTION_KEY, path.display());
                println!("Hint: Stores created with a previous secret can only be read with that secret.");
            }
        }
        None => println!("{}", secret.expose_secret()),
    }
    Ok(())
}
