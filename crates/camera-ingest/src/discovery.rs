//! Device enumeration and codec/ISP filtering.
//!
//! SoC boards expose their hardware video blocks (decoders, encoders, ISPs,
//! scalers) as `/dev/video*` nodes right next to real cameras. Those nodes
//! open fine but never produce camera frames, so enumeration groups nodes by
//! the name the driver declares and drops every group whose name matches the
//! deny-list before anything is opened.

use std::process::Command;

use thiserror::Error;

use crate::types::{Backend, DeviceCandidate, DeviceId};

/// Name fragments identifying non-camera video devices.
pub const DEFAULT_DENY_KEYWORDS: &[&str] = &[
    "codec", "decoder", "encoder", "scaler", "isp", "bcm2835", "rpivid", "hantro", "cedrus",
    "pispbe", "rkvdec", "mem2mem",
];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Produces the platform's view of attached video devices.
pub trait DeviceLister {
    fn list(&self) -> Result<Vec<DeviceCandidate>, DiscoveryError>;
}

/// Lists devices through `v4l2-ctl --list-devices`.
#[derive(Clone, Debug, Default)]
pub struct V4l2CtlLister;

const V4L2_CTL: &str = "v4l2-ctl";

impl DeviceLister for V4l2CtlLister {
    fn list(&self) -> Result<Vec<DeviceCandidate>, DiscoveryError> {
        let output = Command::new(V4L2_CTL)
            .arg("--list-devices")
            .output()
            .map_err(|source| DiscoveryError::Spawn {
                tool: V4L2_CTL,
                source,
            })?;

        // v4l2-ctl exits non-zero when some nodes fail to open but still
        // prints the ones it could read.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            return Err(DiscoveryError::Failed {
                tool: V4L2_CTL,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_v4l2_listing(&stdout))
    }
}

/// Parse `v4l2-ctl --list-devices` output.
///
/// Unindented lines are device names (with a trailing colon), indented lines
/// below them are nodes. Only `/dev/video*` nodes are returned.
pub fn parse_v4l2_listing(output: &str) -> Vec<DeviceCandidate> {
    let mut candidates = Vec::new();
    let mut current_name: Option<String> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with(char::is_whitespace) {
            let name = line.trim().trim_end_matches(':').trim().to_string();
            current_name = Some(name);
            continue;
        }

        let node = line.trim();
        if !node.starts_with("/dev/video") {
            continue;
        }
        let Some(name) = current_name.as_ref() else {
            continue;
        };
        candidates.push(DeviceCandidate {
            id: DeviceId::Path(node.to_string()),
            declared_name: name.clone(),
            backend_hint: Some(Backend::PlatformNative),
        });
    }

    candidates
}

/// Devices sharing one declared name, in listing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceGroup {
    pub declared_name: String,
    pub candidates: Vec<DeviceCandidate>,
}

/// Group candidates by declared name, keeping first-seen order.
pub fn group_by_name(candidates: Vec<DeviceCandidate>) -> Vec<DeviceGroup> {
    let mut groups: Vec<DeviceGroup> = Vec::new();
    for candidate in candidates {
        match groups
            .iter_mut()
            .find(|group| group.declared_name == candidate.declared_name)
        {
            Some(group) => group.candidates.push(candidate),
            None => groups.push(DeviceGroup {
                declared_name: candidate.declared_name.clone(),
                candidates: vec![candidate],
            }),
        }
    }
    groups
}

/// Case-insensitive substring deny-list over declared device names.
#[derive(Clone, Debug)]
pub struct DenyList {
    keywords: Vec<String>,
}

impl Default for DenyList {
    fn default() -> Self {
        Self::new(DEFAULT_DENY_KEYWORDS.iter().copied())
    }
}

impl DenyList {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { keywords }
    }

    /// Default keywords plus `extra`.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        list.keywords.extend(
            extra
                .into_iter()
                .map(|keyword| keyword.as_ref().trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty()),
        );
        list
    }

    /// The keyword `name` matches, if any.
    pub fn matched<'a>(&'a self, name: &str) -> Option<&'a str> {
        let lowered = name.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| lowered.contains(keyword.as_str()))
            .map(String::as_str)
    }

    pub fn is_denied(&self, name: &str) -> bool {
        self.matched(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PI_LISTING: &str = "\
bcm2835-codec-decode (platform:bcm2835-codec):
\t/dev/video10
\t/dev/video11
\t/dev/video12
\t/dev/media3

bcm2835-isp (platform:bcm2835-isp):
\t/dev/video13
\t/dev/video14
\t/dev/media0

HD Webcam C615 (usb-3f980000.usb-1.3):
\t/dev/video0
\t/dev/video1
\t/dev/media4
";

    #[test]
    fn parses_names_and_video_nodes_only() {
        let candidates = parse_v4l2_listing(PI_LISTING);
        let paths: Vec<String> = candidates.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/dev/video10",
                "/dev/video11",
                "/dev/video12",
                "/dev/video13",
                "/dev/video14",
                "/dev/video0",
                "/dev/video1",
            ]
        );
        assert_eq!(
            candidates[5].declared_name,
            "HD Webcam C615 (usb-3f980000.usb-1.3)"
        );
        assert!(
            candidates
                .iter()
                .all(|c| c.backend_hint == Some(Backend::PlatformNative))
        );
    }

    #[test]
    fn groups_keep_listing_order() {
        let groups = group_by_name(parse_v4l2_listing(PI_LISTING));
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].candidates.len(), 3);
        assert_eq!(groups[2].declared_name, "HD Webcam C615 (usb-3f980000.usb-1.3)");
        assert_eq!(groups[2].candidates.len(), 2);
    }

    #[test]
    fn deny_list_is_case_insensitive() {
        let deny = DenyList::default();
        assert!(deny.is_denied("bcm2835-codec-decode (platform:bcm2835-codec)"));
        assert!(deny.is_denied("Hantro G1 VPU"));
        assert!(deny.is_denied("rkisp1_mainpath"));
        assert!(deny.is_denied("VIDEO ENCODER"));
        assert!(!deny.is_denied("HD Webcam C615 (usb-3f980000.usb-1.3)"));
        assert!(!deny.is_denied("unicam (platform:fe801000.csi)"));
    }

    #[test]
    fn extra_keywords_extend_defaults() {
        let deny = DenyList::with_extra(["  Loopback ", ""]);
        assert!(deny.is_denied("Dummy video device (0x0000) LOOPBACK"));
        assert!(deny.is_denied("some scaler"));
        assert_eq!(deny.matched("v4l2 loopback"), Some("loopback"));
    }

    #[test]
    fn orphan_nodes_without_name_are_skipped() {
        let candidates = parse_v4l2_listing("\t/dev/video0\n");
        assert!(candidates.is_empty());
    }
}
