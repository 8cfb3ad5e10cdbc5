//! `conductor integrations`: how each integration resolves against the
//! current environment.

use conductor_config::{IntegrationRegistry, IntegrationTransport, LoadedEnv};

use crate::terminal_output::{note_info, render_table, status_label, Column};

pub fn run(registry: &IntegrationRegistry, env: &LoadedEnv) {
    let resolved = registry.resolve_all(env);
    if resolved.is_empty() {
        note_info("No integrations configured.");
        return;
    }

    let rows: Vec<Vec<String>> = resolved
        .iter()
        .map(|r| {
            let transport = match registry.get(&r.name).map(|spec| &spec.transport) {
                Some(IntegrationTransport::Command { .. }) => "command",
                Some(IntegrationTransport::Http { .. }) => "http",
                None => "?",
            };
            vec![
                r.name.clone(),
                transport.to_string(),
                status_label(if r.valid { "valid" } else { "invalid" }),
                r.missing_env.join(", "),
                r.tools.join(", "),
            ]
        })
        .collect();

    let columns = [
        Column::left("Integration"),
        Column::left("Transport"),
        Column::left("Status"),
        Column::left("Missing env"),
        Column::left("Tools").max_width(48),
    ];
    print!("{}", render_table(&columns, &rows));
    if let Some(path) = env.dotenv_path() {
        note_info(&format!("Environment loaded from {}", path.display()));
    }
}
