//! Agent URL normalization and custom-header collection.

use std::net::IpAddr;

use a2a_inspector_protocol::CustomHeaders;
use reqwest::Url;

use crate::error::TargetError;

/// Normalize an operator-supplied agent URL.
///
/// Whitespace is trimmed and `http://` is assumed when no scheme is given.
/// The host must look like a real host name: it has to contain a dot, be
/// `localhost`, or be an IPv4/IPv6 literal.
pub fn normalize_agent_url(input: &str) -> Result<String, TargetError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TargetError::Empty);
    }

    let candidate = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = Url::parse(&candidate).map_err(|e| TargetError::Invalid {
        url: candidate.clone(),
        reason: e.to_string(),
    })?;

    let host = parsed.host_str().unwrap_or_default();
    let is_ip = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok();
    if !is_ip && !host.contains('.') && host != "localhost" {
        return Err(TargetError::Invalid {
            url: candidate,
            reason: format!("host '{host}' is not a fully qualified name"),
        });
    }

    Ok(candidate)
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Collect header rows into a header map.
///
/// Names and values are trimmed; rows with an empty name or value are
/// skipped. A later row with the same name replaces an earlier one.
pub fn collect_headers<I, N, V>(rows: I) -> CustomHeaders
where
    I: IntoIterator<Item = (N, V)>,
    N: AsRef<str>,
    V: AsRef<str>,
{
    rows.into_iter()
        .filter_map(|(name, value)| {
            let name = name.as_ref().trim();
            let value = value.as_ref().trim();
            if name.is_empty() || value.is_empty() {
                None
            } else {
                Some((name.to_string(), value.to_string()))
            }
        })
        .collect()
}

/// Split a `NAME=VALUE` or `NAME: VALUE` command-line header argument.
pub fn parse_header_arg(arg: &str) -> Result<(String, String), String> {
    let split = arg
        .find(['=', ':'])
        .map(|index| (&arg[..index], &arg[index + 1..]));
    match split {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{arg}'")),
    }
}
