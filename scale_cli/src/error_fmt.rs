//! Human-readable error descriptions and structured JSON error formatting.

use scale_core::ScaleError;

fn scale_error(err: &eyre::Report) -> Option<&ScaleError> {
    err.chain().find_map(|e| e.downcast_ref::<ScaleError>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = scale_error(err) {
        return match se {
            ScaleError::NotConnected | ScaleError::Link(_) => "What happened: The weight indicator could not be reached.\nLikely causes: Wrong [link] host/port or serial device, instrument powered off, or cabling fault.\nHow to fix: Check the [link] section and the instrument, then rerun `openscale self-check`.".to_string(),
            ScaleError::Timeout => "What happened: The weight indicator did not answer in time.\nLikely causes: Wrong slave_id, wrong serial parameters, or link.timeout_ms too low.\nHow to fix: Verify slave_id, baud, parity and stop_bits against the instrument setup.".to_string(),
            ScaleError::Exception(code) => format!(
                "What happened: The indicator rejected a request ({code}).\nLikely causes: The configured indicator.model does not match the connected instrument.\nHow to fix: Set [indicator] model to the instrument actually wired in."
            ),
            ScaleError::NoData | ScaleError::Stale { .. } => "What happened: No fresh weight reading is available.\nLikely causes: Continuous reads are failing or timing.state_read_interval_ms exceeds indicator.stale_after_ms.\nHow to fix: Check the link, or raise indicator.stale_after_ms.".to_string(),
            ScaleError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            ScaleError::Storage(msg) => format!(
                "What happened: The record files could not be read or written ({msg}).\nLikely causes: storage.dir is not writable, or db.json was edited by hand and is no longer valid JSON.\nHow to fix: Check permissions on storage.dir and the JSON syntax of its files."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return "What happened: The config file could not be read.\nLikely causes: Wrong --config path.\nHow to fix: Pass an existing file with --config, or create etc/openscale.toml.".to_string();
    }
    if lower.contains("parse config") {
        let cause = err.source().map(|s| format!(" ({s})")).unwrap_or_default();
        return format!(
            "What happened: The config file is not valid TOML for this controller{cause}.\nHow to fix: Compare it with etc/openscale.toml."
        );
    }
    if lower.contains("gpio") {
        return "What happened: Failed to open the sensor GPIO line.\nLikely causes: Wrong sensor.gpio_pin, missing `hardware` feature, or insufficient GPIO permissions.\nHow to fix: Fix [sensor] or set source = \"none\".".to_string();
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 link, 4 storage, 5 configuration, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match scale_error(err) {
        Some(
            ScaleError::NotConnected
            | ScaleError::Link(_)
            | ScaleError::Timeout
            | ScaleError::Exception(_),
        ) => 3,
        Some(ScaleError::Storage(_)) => 4,
        Some(ScaleError::Config(_) | ScaleError::InvalidArgument(_)) => 5,
        _ => 1,
    }
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    match scale_error(err) {
        Some(ScaleError::NotConnected | ScaleError::Link(_)) => "Link",
        Some(ScaleError::Timeout) => "Timeout",
        Some(ScaleError::Exception(_)) => "Exception",
        Some(ScaleError::NoData | ScaleError::Stale { .. }) => "NoData",
        Some(ScaleError::Storage(_)) => "Storage",
        Some(ScaleError::Config(_) | ScaleError::InvalidArgument(_)) => "Config",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}
