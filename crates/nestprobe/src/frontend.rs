use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use nestprobe_core::{Config, MetricKind, ProberManager, Series};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

struct AppState {
    metrics_path: String,
    manager: Arc<ProberManager>,
}

/// Serve the scrape endpoint and a small landing page.
pub async fn serve(config: &Config, manager: Arc<ProberManager>) -> anyhow::Result<()> {
    let metrics_path = config.metrics_path().to_string();
    let state = Arc::new(AppState {
        metrics_path: metrics_path.clone(),
        manager,
    });
    let app = Router::new()
        .route("/", get(root))
        .route(&metrics_path, get(metrics))
        .with_state(state);
    let listener = TcpListener::bind(config.listen_address()).await?;
    info!(
        "listening for {} on {}",
        metrics_path,
        config.listen_address()
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root(State(state): State<Arc<AppState>>) -> Html<String> {
    let version = env!("CARGO_PKG_VERSION");
    Html(format!(
        "<html>\
         <head><title>Nestprobe (Version {version})</title></head>\
         <body>\
         <h1>Nestprobe</h1>\
         <p><a href=\"{}\">Metrics</a></p>\
         </body>\
         </html>",
        state.metrics_path
    ))
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    render(&state.manager.collect())
}

/// Render the collected series in the Prometheus text exposition format.
///
/// Samples are grouped by series name so each `# TYPE` header precedes all
/// samples of its metric.
fn render(series: &[Series]) -> String {
    let mut groups: BTreeMap<&str, (&Series, Vec<String>)> = BTreeMap::new();
    for s in series {
        let labels = s
            .labels
            .iter()
            .map(|label| format!("{}=\"{}\"", label.key, label.value))
            .collect::<Vec<_>>()
            .join(",");
        let sample = if labels.is_empty() {
            format!("{} {}", s.name, s.value)
        } else {
            format!("{}{{{labels}}} {}", s.name, s.value)
        };
        groups
            .entry(s.name.as_str())
            .or_insert_with(|| (s, Vec::new()))
            .1
            .push(sample);
    }
    let mut data = Vec::new();
    for (name, (series, samples)) in groups {
        let kind = match series.kind {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        };
        data.push(format!("# HELP {name} {}", series.help));
        data.push(format!("# TYPE {name} {kind}"));
        data.extend(samples);
    }
    let mut content = data.join("\n");
    content.push('\n');
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestprobe_core::Label;

    fn series(name: &str, kind: MetricKind, labels: &[(&str, &str)], value: u64) -> Series {
        Series {
            name: name.to_string(),
            help: "help text",
            kind,
            labels: labels
                .iter()
                .map(|(key, value)| Label {
                    key: (*key).to_string(),
                    value: (*value).to_string(),
                })
                .collect(),
            value,
        }
    }

    #[test]
    fn test_render_groups_by_series_name() {
        let collected = vec![
            series(
                "nestprobe_packets_sent",
                MetricKind::Counter,
                &[("tos", "BE"), ("path", "lab1")],
                25,
            ),
            series(
                "nestprobe_rtt_min",
                MetricKind::Gauge,
                &[("tos", "BE"), ("path", "lab1")],
                1_000_000,
            ),
            series(
                "nestprobe_packets_sent",
                MetricKind::Counter,
                &[("tos", "BE"), ("path", "lab2")],
                50,
            ),
        ];
        let rendered = render(&collected);
        let expected = "\
# HELP nestprobe_packets_sent help text
# TYPE nestprobe_packets_sent counter
nestprobe_packets_sent{tos=\"BE\",path=\"lab1\"} 25
nestprobe_packets_sent{tos=\"BE\",path=\"lab2\"} 50
# HELP nestprobe_rtt_min help text
# TYPE nestprobe_rtt_min gauge
nestprobe_rtt_min{tos=\"BE\",path=\"lab1\"} 1000000
";
        assert_eq!(expected, rendered);
    }

    #[test]
    fn test_render_unlabelled_series() {
        let rendered = render(&[series("nestprobe_up", MetricKind::Gauge, &[], 1)]);
        assert!(rendered.contains("nestprobe_up 1\n"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!("\n", render(&[]));
    }
}
