use crate::output::print_json;

pub fn run(json: bool) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        return print_json(&serde_json::json!({ "name": "nwave-copilot", "version": version }));
    }
    println!("nwave-copilot {version}");
    Ok(())
}
