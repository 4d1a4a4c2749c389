//! Template variable substitution for display text
//!
//! Supported variables: `{ip}`, `{time}`, `{date}`, `{output}` and
//! `{random_A_B}`, which expands to a random integer in `[A, B]`.

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use rand::Rng;
use regex::{Captures, Regex};

use super::{DEFAULT_DATE_FORMAT, DEFAULT_TIME_FORMAT};

static RANDOM_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{random_(\d+)_(\d+)\}").expect("valid regex"));

/// Values available to a template
pub struct TemplateVars<'a> {
    pub now: DateTime<Local>,
    /// Command output for `{output}`
    pub output: Option<&'a str>,
    /// Resolves `{ip}`; only called when the template uses it
    pub ip: &'a dyn Fn() -> String,
}

/// Expand every known variable in `text`
#[must_use]
pub fn substitute_variables(text: &str, vars: &TemplateVars<'_>) -> String {
    let mut rng = rand::thread_rng();
    let mut out = RANDOM_VAR
        .replace_all(text, |caps: &Captures<'_>| random_in_range(&caps[1], &caps[2], &mut rng))
        .into_owned();

    if out.contains("{ip}") {
        out = out.replace("{ip}", &(vars.ip)());
    }
    if out.contains("{time}") {
        out = out.replace("{time}", &vars.now.format(DEFAULT_TIME_FORMAT).to_string());
    }
    if out.contains("{date}") {
        out = out.replace("{date}", &vars.now.format(DEFAULT_DATE_FORMAT).to_string());
    }
    if let Some(output) = vars.output {
        out = out.replace("{output}", output);
    }

    out
}

fn random_in_range(low: &str, high: &str, rng: &mut impl Rng) -> String {
    // Digits only, but may still overflow
    let (Ok(low), Ok(high)) = (low.parse::<u64>(), high.parse::<u64>()) else {
        return format!("{{random_{low}_{high}}}");
    };
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    rng.gen_range(low..=high).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn vars<'a>(output: Option<&'a str>, ip: &'a dyn Fn() -> String) -> TemplateVars<'a> {
        TemplateVars {
            now: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            output,
            ip,
        }
    }

    #[test]
    fn time_date_and_ip_are_expanded() {
        let ip = || "192.168.1.20".to_string();
        let text = substitute_variables("{ip} at {time} on {date}", &vars(None, &ip));
        assert_eq!(text, "192.168.1.20 at 14:05:07 on 03/09/24");
    }

    #[test]
    fn ip_is_only_resolved_when_used() {
        let ip = || -> String { panic!("ip lookup should not run") };
        assert_eq!(substitute_variables("hello", &vars(None, &ip)), "hello");
    }

    #[test]
    fn random_stays_in_range() {
        let ip = String::new;
        for _ in 0..200 {
            let value: u64 = substitute_variables("{random_3_7}", &vars(None, &ip))
                .parse()
                .unwrap();
            assert!((3..=7).contains(&value));
        }

        for _ in 0..200 {
            let reversed: u64 = substitute_variables("{random_7_3}", &vars(None, &ip))
                .parse()
                .unwrap();
            assert!((3..=7).contains(&reversed));
        }

        let single: u64 = substitute_variables("{random_9_9}", &vars(None, &ip))
            .parse()
            .unwrap();
        assert_eq!(single, 9);
    }

    #[test]
    fn output_is_substituted_when_present() {
        let ip = String::new;
        assert_eq!(
            substitute_variables("Up: {output}", &vars(Some("3 days"), &ip)),
            "Up: 3 days"
        );
        assert_eq!(
            substitute_variables("Up: {output}", &vars(None, &ip)),
            "Up: {output}"
        );
    }
}
