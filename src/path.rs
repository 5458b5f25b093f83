//! Path parsing and mount resolution.
//!
//! Two grammars are accepted, both with an optional `scheme://` prefix:
//!
//! - direct: `bucket@namespace/key...`
//! - mount: `mountName[:resourceType:resourceKey[:resourceKey2]]@lakeId/key...`
//!
//! A path is treated as a mount path when its scheme is `ocilake`, when the
//! segment before `@` contains `:`, or when the lake id starts with
//! `ocid1.lake`. `@namespace` on its own addresses the storage root.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::MountResolver;
use crate::error::{FsError, Result};

/// Path separator inside keys.
pub const SEP: char = '/';

const MOUNT_SCHEME: &str = "ocilake";
const LAKE_ID_PREFIX: &str = "ocid1.lake";

/// Concrete location in the store.
///
/// `bucket` is empty only for the storage root of a namespace. `key` never
/// starts or ends with a separator and is empty for a bucket root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPath {
    pub bucket: String,
    pub namespace: String,
    pub key: String,
}

impl ResolvedPath {
    pub fn new(bucket: impl Into<String>, namespace: impl Into<String>, key: &str) -> Self {
        Self {
            bucket: bucket.into(),
            namespace: namespace.into(),
            key: normalize_key(key),
        }
    }

    /// Storage root of a namespace.
    pub fn root(namespace: impl Into<String>) -> Self {
        Self {
            bucket: String::new(),
            namespace: namespace.into(),
            key: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.bucket.is_empty()
    }

    pub fn is_bucket(&self) -> bool {
        !self.bucket.is_empty() && self.key.is_empty()
    }

    /// Listing prefix for the children of this path (`key/`, or empty at a bucket root).
    pub fn dir_prefix(&self) -> String {
        if self.key.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.key, SEP)
        }
    }

    pub fn same_bucket(&self, other: &ResolvedPath) -> bool {
        self.bucket == other.bucket && self.namespace == other.namespace
    }

    /// Same bucket, different key.
    pub fn with_key(&self, key: &str) -> Self {
        Self::new(self.bucket.clone(), self.namespace.clone(), key)
    }

    /// Append a relative path to the key.
    pub fn join(&self, rel: &str) -> Self {
        if self.key.is_empty() {
            self.with_key(rel)
        } else {
            self.with_key(&format!("{}{}{}", self.key, SEP, rel))
        }
    }

    pub fn parent(&self) -> Option<ResolvedPath> {
        if self.is_root() {
            return None;
        }
        if self.key.is_empty() {
            return Some(Self::root(self.namespace.clone()));
        }
        let parent_key = self.key.rsplit_once(SEP).map(|(p, _)| p).unwrap_or("");
        Some(self.with_key(parent_key))
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        if !self.key.is_empty() {
            self.key.rsplit(SEP).next().unwrap_or(self.key.as_str())
        } else if !self.bucket.is_empty() {
            &self.bucket
        } else {
            &self.namespace
        }
    }

    /// Canonical display form: `bucket@namespace/key`, `bucket@namespace` or `@namespace`.
    pub fn to_path_string(&self) -> String {
        if self.key.is_empty() {
            format!("{}@{}", self.bucket, self.namespace)
        } else {
            format!("{}@{}{}{}", self.bucket, self.namespace, SEP, self.key)
        }
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path_string())
    }
}

/// Resource scope of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Plain,
    Database,
    Table,
    User,
}

impl MountType {
    /// Parse a resource type token (case-insensitive). `Plain` has no token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "database" => Some(MountType::Database),
            "table" => Some(MountType::Table),
            "user" => Some(MountType::User),
            _ => None,
        }
    }

    /// Number of resource keys the type requires.
    pub fn key_count(&self) -> usize {
        match self {
            MountType::Plain => 0,
            MountType::Database | MountType::User => 1,
            MountType::Table => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MountType::Plain => "plain",
            MountType::Database => "database",
            MountType::Table => "table",
            MountType::User => "user",
        }
    }
}

impl fmt::Display for MountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indirect location resolved through the mount metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MountDescriptor {
    pub mount_name: String,
    pub mount_type: MountType,
    pub resource_keys: Vec<String>,
    pub lake_id: String,
}

impl MountDescriptor {
    pub fn plain(mount_name: &str, lake_id: &str) -> Self {
        Self {
            mount_name: mount_name.to_string(),
            mount_type: MountType::Plain,
            resource_keys: Vec::new(),
            lake_id: lake_id.to_string(),
        }
    }

    pub fn scoped(mount_name: &str, mount_type: MountType, keys: &[&str], lake_id: &str) -> Self {
        Self {
            mount_name: mount_name.to_string(),
            mount_type,
            resource_keys: keys.iter().map(|k| k.to_string()).collect(),
            lake_id: lake_id.to_string(),
        }
    }

    /// Cache key identifying the mount: the mount segment in path form.
    pub fn signature(&self) -> String {
        let mut sig = self.mount_name.clone();
        if self.mount_type != MountType::Plain {
            sig.push(':');
            sig.push_str(self.mount_type.as_str());
            for key in &self.resource_keys {
                sig.push(':');
                sig.push_str(key);
            }
        }
        sig.push('@');
        sig.push_str(&self.lake_id);
        sig
    }
}

/// Result of parsing a path string, before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPath {
    Direct(ResolvedPath),
    Mount { mount: MountDescriptor, key: String },
}

/// Parse a path string without resolving mounts. Never touches the network.
pub fn parse(path: &str) -> Result<ParsedPath> {
    let (scheme, rest) = match path.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, path),
    };
    let rest = rest.trim_start_matches(SEP);

    let (head, tail) = rest
        .split_once('@')
        .ok_or_else(|| FsError::invalid_path(path, "missing '@' between bucket and namespace"))?;
    let (namespace, key) = tail.split_once(SEP).unwrap_or((tail, ""));

    if namespace.is_empty() {
        return Err(FsError::invalid_path(path, "empty namespace"));
    }

    let is_mount = scheme.is_some_and(|s| s.eq_ignore_ascii_case(MOUNT_SCHEME))
        || head.contains(':')
        || namespace.starts_with(LAKE_ID_PREFIX);

    if is_mount {
        let mount = parse_mount(path, head, namespace)?;
        return Ok(ParsedPath::Mount {
            mount,
            key: normalize_key(key),
        });
    }

    let resolved = ResolvedPath::new(head, namespace, key);
    if resolved.is_root() && !resolved.key.is_empty() {
        return Err(FsError::invalid_path(path, "key given without a bucket"));
    }
    Ok(ParsedPath::Direct(resolved))
}

fn parse_mount(path: &str, head: &str, lake_id: &str) -> Result<MountDescriptor> {
    let mut parts = head.split(':');
    let mount_name = parts.next().unwrap_or_default();
    if mount_name.is_empty() {
        return Err(FsError::invalid_path(path, "empty mount name"));
    }

    let Some(token) = parts.next() else {
        return Ok(MountDescriptor::plain(mount_name, lake_id));
    };
    let mount_type = MountType::from_token(token).ok_or_else(|| {
        FsError::invalid_path(
            path,
            format!("resource type {:?} is not one of database, table, user", token),
        )
    })?;

    let keys: Vec<&str> = parts.collect();
    if keys.len() != mount_type.key_count() {
        return Err(FsError::invalid_path(
            path,
            format!(
                "{} mounts take {} resource key(s), got {}",
                mount_type,
                mount_type.key_count(),
                keys.len()
            ),
        ));
    }
    if keys.iter().any(|k| k.is_empty()) {
        return Err(FsError::invalid_path(path, "empty resource key"));
    }

    Ok(MountDescriptor::scoped(mount_name, mount_type, &keys, lake_id))
}

/// Strip leading and trailing separators and collapse repeated ones.
pub fn normalize_key(key: &str) -> String {
    key.split(SEP)
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent of a canonical path string: `b@ns/a/b` -> `b@ns/a` -> `b@ns` -> `@ns`.
pub fn parent_path(path: &str) -> Option<String> {
    if path.starts_with('@') {
        return None;
    }
    if let Some((parent, _)) = path.rsplit_once(SEP) {
        return Some(parent.to_string());
    }
    path.split_once('@').map(|(_, ns)| format!("@{}", ns))
}

/// A canonical path followed by all of its ancestors up to the storage root.
pub fn ancestor_chain(path: &str) -> Vec<String> {
    let mut chain = vec![path.to_string()];
    let mut current = path.to_string();
    while let Some(parent) = parent_path(&current) {
        chain.push(parent.clone());
        current = parent;
    }
    chain
}

/// Turns path strings into [`ResolvedPath`]s, caching mount lookups.
pub struct PathResolver {
    mounts: Option<Arc<dyn MountResolver>>,
    mount_cache: RwLock<HashMap<String, (String, String)>>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PathResolver {
    /// Resolver for direct paths only.
    pub fn new() -> Self {
        Self {
            mounts: None,
            mount_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_mounts(mounts: Arc<dyn MountResolver>) -> Self {
        Self {
            mounts: Some(mounts),
            mount_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, path: &str) -> Result<ResolvedPath> {
        match parse(path)? {
            ParsedPath::Direct(resolved) => Ok(resolved),
            ParsedPath::Mount { mount, key } => {
                let (bucket, namespace) = self.lookup(&mount)?;
                Ok(ResolvedPath::new(bucket, namespace, &key))
            }
        }
    }

    /// Canonical display path of a location given as parts.
    pub fn to_path_string(bucket: &str, namespace: &str, key: &str) -> String {
        let bucket = bucket.rsplit("://").next().unwrap_or(bucket);
        ResolvedPath::new(bucket.trim_start_matches(SEP), namespace, key).to_path_string()
    }

    /// Resolve and return the canonical form of a path string.
    pub fn normalize(&self, path: &str) -> Result<String> {
        Ok(self.resolve(path)?.to_path_string())
    }

    /// Forget every cached mount mapping.
    pub fn clear_mounts(&self) {
        self.mount_cache.write().clear();
    }

    fn lookup(&self, mount: &MountDescriptor) -> Result<(String, String)> {
        let signature = mount.signature();
        if let Some(hit) = self.mount_cache.read().get(&signature) {
            return Ok(hit.clone());
        }

        let resolver = self.mounts.as_ref().ok_or_else(|| {
            FsError::MountResolution(format!("{}: no mount resolver configured", signature))
        })?;

        debug!(mount = %signature, "resolving mount");
        let mapping = resolver
            .resolve_mount(mount)
            .map_err(|e| FsError::MountResolution(format!("{}: {}", signature, e)))?
            .ok_or_else(|| FsError::MountResolution(format!("{}: no mapping", signature)))?;

        debug!(mount = %signature, bucket = %mapping.0, namespace = %mapping.1, "mount resolved");
        self.mount_cache.write().insert(signature, mapping.clone());
        Ok(mapping)
    }
}
