use tracing_subscriber::EnvFilter;

pub const FORMAT_ENV: &str = "PERF_LOG_FORMAT";

/// Installs the global subscriber. Logs go to stderr so stdout stays free for
/// command output. `RUST_LOG` overrides the default `info` level.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = json || json_from_env();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        let _ = subscriber
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_line_number(true)
            .try_init();
    } else {
        let _ = subscriber.with_target(false).try_init();
    }
}

fn json_from_env() -> bool {
    std::env::var(FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
