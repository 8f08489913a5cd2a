use anyhow::Context;
use clap::ArgMatches;
use execgate_runtime::{ExecutionGateway, ExecutionRequest, RejectionCode, Verdict};
use serde_json::json;

/// Dry run: decode and validate one request, print the verdict as JSON.
/// Nothing is executed and the request id is not consumed.
pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = super::load_config(matches)?;
    let path = matches
        .get_one::<String>("file")
        .context("--file is required")?;
    let payload =
        std::fs::read(path).with_context(|| format!("failed to read request file {}", path))?;

    let output = match serde_json::from_slice::<ExecutionRequest>(&payload) {
        Ok(request) => {
            let gateway = ExecutionGateway::builder(config).build()?;
            verdict_json(&request.execution_request_id, &gateway.dry_run(&request))
        }
        Err(e) => json!({
            "execution_request_id": "",
            "verdict": "reject",
            "rejection_code": RejectionCode::SchemaMalformed,
            "reason": format!("Malformed request payload: {}", e),
        }),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn verdict_json(execution_request_id: &str, verdict: &Verdict) -> serde_json::Value {
    match verdict {
        Verdict::Allow => json!({
            "execution_request_id": execution_request_id,
            "verdict": "allow",
        }),
        Verdict::Reject(rejection) => json!({
            "execution_request_id": execution_request_id,
            "verdict": "reject",
            "rejection_code": rejection.code,
            "reason": rejection.reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use execgate_runtime::Rejection;

    #[test]
    fn test_verdict_json() {
        let allow = verdict_json("req-1", &Verdict::Allow);
        assert_eq!(allow["verdict"], "allow");
        assert!(allow.get("rejection_code").is_none());

        let reject = verdict_json(
            "req-1",
            &Verdict::Reject(Rejection::new(RejectionCode::SecurityPrivileged, "nope")),
        );
        assert_eq!(reject["rejection_code"], "R-SEC-002");
        assert_eq!(reject["reason"], "nope");
    }
}
