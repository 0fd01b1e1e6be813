use crate::config::PathMapping;

/// Translation of file paths between a controller and the debugged program.
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    /// Mapping from program paths to controller paths.
    server_to_client: Vec<(String, String)>,
    /// Reverse mapping from controller paths to program paths.
    client_to_server: Vec<(String, String)>,
}

impl SourceMap {
    /// Build a map from `(client prefix, server prefix)` pairs.
    pub fn new(pairs: &[(String, String)]) -> Self {
        let mut sm = SourceMap::default();
        for (client_prefix, server_prefix) in pairs {
            sm.server_to_client
                .push((Self::norm_prefix(server_prefix), client_prefix.clone()));
            sm.client_to_server
                .push((Self::norm_prefix(client_prefix), server_prefix.clone()));
        }

        // Longest prefix wins.
        sm.server_to_client
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        sm.client_to_server
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        sm
    }

    pub fn from_config(mappings: &[PathMapping]) -> Self {
        let pairs: Vec<_> = mappings
            .iter()
            .map(|m| (m.client.clone(), m.server.clone()))
            .collect();
        Self::new(&pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.server_to_client.is_empty()
    }

    pub fn to_client(&self, server_path: &str) -> String {
        self.apply_map(server_path, &self.server_to_client)
    }

    /// Program path of a controller path, separators are normalized to `/`.
    pub fn to_server(&self, client_path: &str) -> String {
        Self::norm_path(&self.apply_map(client_path, &self.client_to_server))
    }

    fn apply_map(&self, path: &str, mapping: &[(String, String)]) -> String {
        let normalized = Self::norm_path(path);
        for (from_norm, to_raw) in mapping {
            if normalized.starts_with(from_norm.as_str()) {
                let suffix = &normalized[from_norm.len()..];
                return Self::join_with_style(to_raw, suffix);
            }
        }
        path.to_string()
    }

    fn join_with_style(prefix: &str, suffix_norm: &str) -> String {
        if suffix_norm.is_empty() {
            return prefix.to_string();
        }
        let mut out = prefix.to_string();

        let windows_style = out.contains('\\');
        if !out.ends_with('/') && !out.ends_with('\\') {
            out.push(if windows_style { '\\' } else { '/' });
        }

        if windows_style {
            out.push_str(&suffix_norm.replace('/', "\\"));
        } else {
            out.push_str(suffix_norm);
        }
        out
    }

    fn norm_prefix(s: &str) -> String {
        let mut out = Self::norm_path(s);
        if !out.ends_with('/') {
            out.push('/');
        }
        out
    }

    fn norm_path(s: &str) -> String {
        s.replace('\\', "/")
    }
}
