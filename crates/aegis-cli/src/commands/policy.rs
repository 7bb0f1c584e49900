//! Tool policy commands

use aegis_gate::{PermissionAuthority, ToolCall};
use aegis_types::{AegisConfig, TrustLevel};
use anyhow::Context;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// List configured tool policies
    List,

    /// Evaluate a hypothetical call against the configured policies
    Check {
        /// Tool identifier
        tool: String,

        /// Requesting agent
        #[arg(long)]
        agent: String,

        /// Caller trust level (system, operator, verified, standard, untrusted, hostile)
        #[arg(long, default_value = "untrusted")]
        trust: String,

        /// Call parameters as JSON
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

pub fn execute(command: PolicyCommands, config: &AegisConfig) -> anyhow::Result<()> {
    let authority = PermissionAuthority::from_policies(config.policies.iter().cloned());
    match command {
        PolicyCommands::List => {
            let policies = authority.policies();
            if policies.is_empty() {
                println!("no tool policies configured");
            }
            for p in policies {
                println!(
                    "{:<28} {:<18} trust>={:<10} route={:?}{}",
                    p.tool_id,
                    p.tier.to_string(),
                    p.required_trust.to_string(),
                    p.route,
                    if p.allow_list.is_empty() {
                        String::new()
                    } else {
                        format!(" allow=[{}]", p.allow_list.join(", "))
                    }
                );
            }
            Ok(())
        }
        PolicyCommands::Check {
            tool,
            agent,
            trust,
            params,
        } => {
            let trust: TrustLevel = trust.parse()?;
            let parameters: serde_json::Value =
                serde_json::from_str(&params).context("--params is not valid JSON")?;
            let call = ToolCall::new(tool, agent, trust, parameters);
            let (decision, _) = authority.evaluate(&call);
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
    }
}
