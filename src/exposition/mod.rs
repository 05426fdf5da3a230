//! Text exposition of gauge observations and the HTTP scrape endpoint.

pub mod server;

use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, Opts, TextEncoder};
use thiserror::Error;

use crate::collectors::{GaugeDescriptor, GaugeObservation};

/// Content type of the text format served on the scrape route.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

#[derive(Debug, Error)]
pub enum ExpositionError {
    #[error("metric encoding failed: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("encoded metrics are not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Render observations as Prometheus text, one gauge family per advertised descriptor.
/// Families without any observation are left out, as are observations of unadvertised kinds.
pub fn encode(
    descriptors: &[GaugeDescriptor],
    observations: &[GaugeObservation],
) -> Result<String, ExpositionError> {
    let mut families = Vec::with_capacity(descriptors.len());
    for desc in descriptors {
        let gauge = GaugeVec::new(Opts::new(desc.name, desc.help), &desc.labels)?;
        for obs in observations.iter().filter(|o| o.kind == desc.kind) {
            gauge
                .get_metric_with_label_values(&obs.labels.values())?
                .set(obs.value);
        }
        families.extend(
            gauge
                .collect()
                .into_iter()
                .filter(|mf| !mf.get_metric().is_empty()),
        );
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{MetricKind, ProcessLabels, DESCRIPTORS};

    fn obs(kind: MetricKind, value: f64, pid: &str, cmd: &str) -> GaugeObservation {
        GaugeObservation {
            kind,
            value,
            labels: ProcessLabels {
                name: "sshd".into(),
                pid: pid.into(),
                cmd: cmd.into(),
                user: "root".into(),
            },
        }
    }

    #[test]
    fn renders_only_families_with_samples() {
        let text = encode(
            &DESCRIPTORS,
            &[
                obs(MetricKind::Memory, 0.9765625, "10", "/usr/sbin/sshd -D"),
                obs(MetricKind::OpenFiles, 5.0, "10", "/usr/sbin/sshd -D"),
            ],
        )
        .unwrap();

        assert!(!text.contains("describe_node_process_cpu_info"));
        assert!(text.contains("# TYPE describe_node_process_memory_info gauge"));
        assert!(text.contains(
            "# HELP describe_node_process_openfiles_info node process openfiles monitor"
        ));
        let labels = r#"{cmd="/usr/sbin/sshd -D",name="sshd",pid="10",user="root"}"#;
        assert!(text.contains(&format!("describe_node_process_memory_info{labels} 0.9765625")));
        assert!(text.contains(&format!("describe_node_process_openfiles_info{labels} 5")));
    }

    #[test]
    fn empty_observation_set_renders_empty_body() {
        assert_eq!(encode(&DESCRIPTORS, &[]).unwrap(), "");
    }

    #[test]
    fn label_values_are_escaped() {
        let cmd = r#"sh -c "echo hi""#;
        let text = encode(&DESCRIPTORS, &[obs(MetricKind::Cpu, 1.5, "1", cmd)]).unwrap();
        assert!(text.contains(r#"cmd="sh -c \"echo hi\"""#));
    }

    #[test]
    fn only_advertised_families_are_rendered() {
        let text = encode(
            &DESCRIPTORS[1..2],
            &[
                obs(MetricKind::Cpu, 2.0, "1", "init"),
                obs(MetricKind::Memory, 0.5, "1", "init"),
            ],
        )
        .unwrap();
        assert!(text.contains("describe_node_process_memory_info{"));
        assert!(!text.contains("describe_node_process_cpu_info"));
    }

    #[test]
    fn content_type_is_text_format() {
        assert!(CONTENT_TYPE.starts_with("text/plain"));
        assert_eq!(CONTENT_TYPE, TextEncoder::new().format_type());
    }
}
