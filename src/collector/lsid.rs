//! `lsf_information` collector: cluster identity from `lsid`.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::command::CommandSource;
use crate::metrics::{MetricDesc, NAMESPACE, SampleSink};

use super::types::{CollectorError, CollectorKind};

const KIND: CollectorKind = CollectorKind::LsfInformation;

fn cluster_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"My\s+cluster\s+name\s+is\s+(\S+)").expect("failed to compile lsid regex")
    })
}

fn master_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"My\s+(?:master|management\s+host)\s+name\s+is\s+(\S+)")
            .expect("failed to compile lsid regex")
    })
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d+\.\d+\.\d+").expect("failed to compile lsid regex"))
}

/// What `lsid` says about the cluster. Fields not found in the text are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterIdentity {
    pub cluster_name: String,
    pub master_name: String,
    pub version: String,
}

impl ClusterIdentity {
    /// Extract the identity from free-form `lsid` output.
    pub fn parse(text: &str) -> Self {
        let capture = |re: &Regex| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };

        Self {
            cluster_name: capture(cluster_name_regex()),
            master_name: capture(master_name_regex()),
            version: version_regex()
                .find(text)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
pub struct InformationCollector {
    info: Arc<MetricDesc>,
}

impl InformationCollector {
    pub fn new() -> Self {
        Self {
            info: MetricDesc::new(
                NAMESPACE,
                "cluster",
                "info",
                "A metric with a constant '1' value labeled by cluster name, master name and version of IBM Spectrum LSF.",
                &["clustername", "mastername", "version"],
            ),
        }
    }

    pub async fn update(
        &self,
        source: &dyn CommandSource,
        sink: &SampleSink,
    ) -> Result<(), CollectorError> {
        let output = source.output("lsid", &[]).await?;
        let identity = ClusterIdentity::parse(&String::from_utf8_lossy(&output));

        if identity == ClusterIdentity::default() {
            tracing::warn!(collector = %KIND, "lsid output did not contain cluster identity");
        }
        tracing::debug!(
            collector = %KIND,
            cluster = %identity.cluster_name,
            master = %identity.master_name,
            version = %identity.version,
            "Collected cluster identity"
        );

        sink.emit(
            &self.info,
            1.0,
            &[
                identity.cluster_name.as_str(),
                identity.master_name.as_str(),
                identity.version.as_str(),
            ],
        );
        Ok(())
    }
}

impl Default for InformationCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::testing::run;
    use crate::command::testing::FakeCommands;

    const FIXTURE: &str = include_str!("../../testdata/lsid.out");

    #[test]
    fn test_parse_identity() {
        let identity = ClusterIdentity::parse(FIXTURE);
        assert_eq!(
            identity,
            ClusterIdentity {
                cluster_name: "cluster1".to_string(),
                master_name: "master01".to_string(),
                version: "10.1.0.13".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_management_host_wording() {
        let text = "IBM Spectrum LSF 10.1.0.14\nMy cluster name is prod\nMy management host name is mgmt01\n";
        let identity = ClusterIdentity::parse(text);
        assert_eq!(identity.master_name, "mgmt01");
        assert_eq!(identity.cluster_name, "prod");
    }

    #[test]
    fn test_parse_partial_identity() {
        let identity = ClusterIdentity::parse("My cluster name is lonely\n");
        assert_eq!(identity.cluster_name, "lonely");
        assert_eq!(identity.master_name, "");
        assert_eq!(identity.version, "");

        assert_eq!(ClusterIdentity::parse(""), ClusterIdentity::default());
    }

    #[tokio::test]
    async fn test_information_sample() {
        let source = FakeCommands::new().with_output("lsid", FIXTURE);
        let (result, samples) = run(KIND, &source).await;
        result.unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].desc.fq_name(), "lsf_cluster_info");
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[0].label_values, ["cluster1", "master01", "10.1.0.13"]);
    }

    #[tokio::test]
    async fn test_information_degrades_to_empty_labels() {
        let source = FakeCommands::new().with_output("lsid", "LSF is down\n");
        let (result, samples) = run(KIND, &source).await;
        result.unwrap();

        assert_eq!(samples[0].label_values, ["", "", ""]);
    }
}
