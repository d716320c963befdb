//! Volumes and mounts for the primary container.
//!
//! Mounts are applied in order: secret refs, configmap refs, then explicit
//! mounts. A later mount on the same path replaces the earlier one.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, SecretVolumeSource, Volume, VolumeMount,
};
use sha2::{Digest, Sha256};

use crate::crd::McpServerDeployment;

pub const SECRET_MOUNT_ROOT: &str = "/etc/mcp/secrets";
pub const CONFIGMAP_MOUNT_ROOT: &str = "/etc/mcp/configmaps";

const MAX_VOLUME_NAME: usize = 63;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumeSet {
    pub volumes: Vec<Volume>,
    pub mounts: Vec<VolumeMount>,
}

impl VolumeSet {
    fn upsert_volume(&mut self, volume: Volume) {
        match self.volumes.iter_mut().find(|v| v.name == volume.name) {
            Some(existing) => *existing = volume,
            None => self.volumes.push(volume),
        }
    }

    fn upsert_mount(&mut self, mount: VolumeMount) {
        match self
            .mounts
            .iter_mut()
            .find(|m| m.mount_path == mount.mount_path)
        {
            Some(existing) => *existing = mount,
            None => self.mounts.push(mount),
        }
    }

    /// Append transport volumes/mounts after the user-derived ones.
    pub fn extend(&mut self, volumes: Vec<Volume>, mounts: Vec<VolumeMount>) {
        for v in volumes {
            self.upsert_volume(v);
        }
        for m in mounts {
            self.upsert_mount(m);
        }
    }
}

const HASH_SUFFIX_LEN: usize = 8;

/// Kubernetes volume names are DNS labels. Names that had to be rewritten
/// or shortened get a hash of the raw ref name so distinct refs never share
/// a volume.
fn volume_name(prefix: &str, ref_name: &str) -> String {
    let raw = format!("{prefix}-{ref_name}");
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if sanitized == raw && raw.len() <= MAX_VOLUME_NAME {
        return raw;
    }

    let digest = Sha256::digest(ref_name.as_bytes());
    let suffix: String = digest
        .iter()
        .take(HASH_SUFFIX_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect();
    let mut base = sanitized;
    base.truncate(MAX_VOLUME_NAME - HASH_SUFFIX_LEN - 1);
    format!("{}-{suffix}", base.trim_end_matches('-'))
}

pub fn secret_volume_name(secret: &str) -> String {
    volume_name("secret", secret)
}

pub fn configmap_volume_name(config_map: &str) -> String {
    volume_name("configmap", config_map)
}

pub fn build_volumes(deployment: &McpServerDeployment) -> VolumeSet {
    let mut set = VolumeSet::default();
    let mut ref_volumes: BTreeSet<String> = BTreeSet::new();

    for secret in deployment.secret_refs.iter().filter(|r| !r.name.is_empty()) {
        let name = secret_volume_name(&secret.name);
        set.upsert_volume(Volume {
            name: name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        });
        set.upsert_mount(VolumeMount {
            name: name.clone(),
            mount_path: format!("{SECRET_MOUNT_ROOT}/{}", secret.name),
            read_only: Some(true),
            ..Default::default()
        });
        ref_volumes.insert(name);
    }

    for cm in deployment
        .config_map_refs
        .iter()
        .filter(|r| !r.name.is_empty())
    {
        let name = configmap_volume_name(&cm.name);
        set.upsert_volume(Volume {
            name: name.clone(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm.name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
        set.upsert_mount(VolumeMount {
            name: name.clone(),
            mount_path: format!("{CONFIGMAP_MOUNT_ROOT}/{}", cm.name),
            read_only: Some(true),
            ..Default::default()
        });
        ref_volumes.insert(name);
    }

    for v in &deployment.volumes {
        ref_volumes.remove(&v.name);
        set.upsert_volume(v.clone());
    }
    for m in &deployment.volume_mounts {
        set.upsert_mount(m.clone());
    }

    // A ref volume whose mount was displaced by an explicit one is dropped.
    let mounted: BTreeSet<&str> =
        set.mounts.iter().map(|m| m.name.as_str()).collect();
    let orphaned: Vec<String> = ref_volumes
        .into_iter()
        .filter(|n| !mounted.contains(n.as_str()))
        .collect();
    set.volumes.retain(|v| !orphaned.contains(&v.name));
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ObjectRef;
    use k8s_openapi::api::core::v1::EmptyDirVolumeSource;

    fn refs(names: &[&str]) -> Vec<ObjectRef> {
        names
            .iter()
            .map(|n| ObjectRef {
                name: n.to_string(),
            })
            .collect()
    }

    #[test]
    fn refs_become_read_only_mounts_at_derived_paths() {
        let d = McpServerDeployment {
            secret_refs: refs(&["api-keys"]),
            config_map_refs: refs(&["settings"]),
            ..Default::default()
        };
        let set = build_volumes(&d);
        assert_eq!(set.volumes.len(), 2);
        assert_eq!(set.mounts[0].mount_path, "/etc/mcp/secrets/api-keys");
        assert_eq!(set.mounts[0].name, "secret-api-keys");
        assert_eq!(set.mounts[0].read_only, Some(true));
        assert_eq!(set.mounts[1].mount_path, "/etc/mcp/configmaps/settings");
        assert_eq!(
            set.volumes[1].config_map.as_ref().unwrap().name,
            "settings"
        );
    }

    #[test]
    fn explicit_mount_wins_on_path_collision() {
        let d = McpServerDeployment {
            secret_refs: refs(&["creds"]),
            volumes: vec![Volume {
                name: "scratch".into(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }],
            volume_mounts: vec![VolumeMount {
                name: "scratch".into(),
                mount_path: "/etc/mcp/secrets/creds".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let set = build_volumes(&d);
        assert_eq!(set.mounts.len(), 1);
        assert_eq!(set.mounts[0].name, "scratch");
        // the displaced secret volume is pruned
        assert_eq!(
            set.volumes.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            vec!["scratch"]
        );
    }

    #[test]
    fn duplicate_refs_collapse() {
        let d = McpServerDeployment {
            secret_refs: refs(&["a", "a"]),
            ..Default::default()
        };
        let set = build_volumes(&d);
        assert_eq!(set.volumes.len(), 1);
        assert_eq!(set.mounts.len(), 1);
    }

    #[test]
    fn volume_names_are_dns_labels() {
        assert_eq!(secret_volume_name("api-keys"), "secret-api-keys");
        let dotted = secret_volume_name("My.Secret");
        assert!(dotted.starts_with("secret-my-secret-"));
        assert_eq!(dotted, secret_volume_name("My.Secret"));
        let long = "x".repeat(100);
        assert!(configmap_volume_name(&long).len() <= 63);
    }

    #[test]
    fn distinct_refs_never_share_a_volume() {
        assert_ne!(
            secret_volume_name("tls.example"),
            secret_volume_name("tls-example")
        );
        let a = format!("{}a", "x".repeat(70));
        let b = format!("{}b", "x".repeat(70));
        assert_ne!(configmap_volume_name(&a), configmap_volume_name(&b));

        let d = McpServerDeployment {
            secret_refs: refs(&["tls.example", "tls-example"]),
            ..Default::default()
        };
        let set = build_volumes(&d);
        assert_eq!(set.volumes.len(), 2);
        for m in &set.mounts {
            let secret = m.mount_path.rsplit('/').next().unwrap();
            let vol = set.volumes.iter().find(|v| v.name == m.name).unwrap();
            assert_eq!(
                vol.secret.as_ref().unwrap().secret_name.as_deref(),
                Some(secret)
            );
        }
    }
}
