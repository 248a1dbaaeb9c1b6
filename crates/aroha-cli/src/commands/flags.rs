use aroha_core::store::VOICE_MODE_FLAG;

use crate::app::AppContext;
use crate::cli::FlagCommand;

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => anyhow::bail!("{} must be on or off (got \"{}\")", VOICE_MODE_FLAG, other),
    }
}

pub fn handle_flag(ctx: &AppContext, command: &FlagCommand) -> anyhow::Result<()> {
    let store = ctx.store()?;

    match command {
        FlagCommand::Get { name } if name == VOICE_MODE_FLAG => {
            let enabled = store.voice_mode()?;
            println!("{}", if enabled { "on" } else { "off" });
        }
        FlagCommand::Get { name } => match store.flag(name)? {
            Some(value) => println!("{}", value),
            None => {
                if !ctx.quiet() {
                    eprintln!("Flag {} is not set", name);
                }
            }
        },
        FlagCommand::Set { name, value } if name == VOICE_MODE_FLAG => {
            let enabled = parse_switch(value)?;
            store.set_voice_mode(enabled)?;
            if !ctx.quiet() {
                println!("Voice mode {}", if enabled { "on" } else { "off" });
            }
        }
        FlagCommand::Set { name, value } => {
            store.set_flag(name, value)?;
            if !ctx.quiet() {
                println!("Set {}", name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_switch() {
        assert!(parse_switch("ON").unwrap());
        assert!(!parse_switch("off").unwrap());
        assert!(parse_switch("loud").is_err());
    }
}
