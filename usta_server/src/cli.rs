use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // USTA_ADMIN_TOKENS and USTA_PII_KEY are secrets and are left out on purpose
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "USTA_HOST",
        "USTA_PORT",
        "USTA_DATABASE_URL",
        "USTA_ESCALATION_INTERVAL",
        "USTA_COMMISSION_TIERS",
        "USTA_DEFAULT_COMMISSION_RATE",
        "USTA_SEARCH_RADIUS_KM",
        "USTA_EXPANDED_RADIUS_KM",
        "USTA_DISPATCH_FANOUT",
        "USTA_CARD_RECEIPT_WINDOW",
        "USTA_COMMISSION_WINDOW",
        "USTA_REJECTION_POLICY",
        "USTA_PENDING_ACTION_TTL",
        "USTA_MAX_ESCALATION_ATTEMPTS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
