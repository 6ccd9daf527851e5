//! Key-value log lines on stdout
//!
//! Every line carries the application name and environment so that log
//! collectors can attribute it without extra context:
//!
//! ```text
//! time=2026-10-16T09:12:03.512Z level=ERROR msg="Error while pushing message" app=@zkorum/agora-broadcast env=production err="no suitable peers available for light-push"
//! ```

use chrono::{SecondsFormat, Utc};
use log::kv::{self, Key, Source, Value, VisitSource};
use log::Record;
use std::io::Write;

/// Install the global logger. `RUST_LOG` overrides the default `info` filter.
pub fn init(app: &str, env: &str) {
    let _ = builder(app, env).try_init();
}

/// Logger builder writing key-value lines to stdout
pub fn builder(app: &str, env: &str) -> env_logger::Builder {
    let app = app.to_string();
    let env = env.to_string();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder
        .target(env_logger::Target::Stdout)
        .format(move |buf, record| {
            let line = render(
                &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                record,
                &app,
                &env,
            );
            writeln!(buf, "{}", line)
        });
    builder
}

/// Render one record as `key=value` pairs
pub fn render(time: &str, record: &Record<'_>, app: &str, env: &str) -> String {
    let mut fields = vec![
        ("time".to_string(), time.to_string()),
        ("level".to_string(), record.level().to_string()),
        ("msg".to_string(), record.args().to_string()),
        ("app".to_string(), app.to_string()),
        ("env".to_string(), env.to_string()),
    ];
    let mut extra = Collect(Vec::new());
    let _ = record.key_values().visit(&mut extra);
    fields.extend(extra.0);

    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, quote(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote values containing whitespace, quotes or `=`
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '=');
    if needs_quotes {
        format!("{:?}", value)
    } else {
        value.to_string()
    }
}

struct Collect(Vec<(String, String)>);

impl<'kvs> VisitSource<'kvs> for Collect {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.0.push((key.as_str().to_string(), value.to_string()));
        Ok(())
    }
}
