use clap::ArgMatches;
use execgate_runtime::RejectionCode;
use serde_json::json;

pub fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    if matches.get_flag("json") {
        let codes: Vec<_> = RejectionCode::ALL
            .iter()
            .map(|code| {
                json!({
                    "code": code.as_str(),
                    "class": code.class().prefix(),
                    "description": code.description(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&codes)?);
        return Ok(());
    }

    println!("Rejection codes:\n");
    for code in RejectionCode::ALL {
        println!("  {:<14} {}", code.as_str(), code.description());
    }
    Ok(())
}
