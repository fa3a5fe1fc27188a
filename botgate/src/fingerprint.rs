// botgate/src/fingerprint.rs
//
// Request fingerprint — everything the pipeline is allowed to see about an
// HTTP request. Built by the hosting middleware, dropped with the context;
// nothing here is retained across requests.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFingerprint {
    pub method: String,
    pub path: String,
    /// Trimmed user agent; empty string when the header was absent.
    pub user_agent: String,
    pub remote_addr: IpAddr,
    /// Headers in arrival order (order itself is a fingerprint).
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub tls: Option<TlsMetadata>,
    #[serde(default)]
    pub alpn: Option<String>,
    #[serde(default)]
    pub tcp: Option<TcpMetadata>,
    #[serde(default)]
    pub h2: Option<H2Metadata>,
    #[serde(default)]
    pub client_features: Option<ClientFeatureBundle>,
}

/// TLS handshake metadata captured at the edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsMetadata {
    pub protocol: String,
    pub cipher_suite: String,
    #[serde(default)]
    pub ja3: Option<String>,
    #[serde(default)]
    pub ja4: Option<String>,
}

/// TCP-level observations, when the edge exposes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TcpMetadata {
    pub ttl: u8,
    pub window_size: u32,
}

/// HTTP/2 SETTINGS and frame-ordering capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct H2Metadata {
    /// (identifier, value) in arrival order.
    pub settings: Vec<(u16, u32)>,
    #[serde(default)]
    pub window_update: Option<u32>,
    #[serde(default)]
    pub priority_frames: bool,
}

impl H2Metadata {
    /// Compact `id:value;…` rendering of the SETTINGS frame, order-sensitive.
    pub fn settings_fingerprint(&self) -> String {
        let mut out = self
            .settings
            .iter()
            .map(|(id, v)| format!("{id}:{v}"))
            .collect::<Vec<_>>()
            .join(";");
        if let Some(wu) = self.window_update {
            out.push_str(&format!("|wu:{wu}"));
        }
        out
    }
}

/// Feature bundle a prior visit may have posted from client-side JS.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientFeatureBundle {
    #[serde(default)]
    pub webdriver: bool,
    #[serde(default)]
    pub plugins: u32,
    #[serde(default)]
    pub languages: u32,
    #[serde(default)]
    pub hardware_concurrency: u32,
    #[serde(default)]
    pub screen: Option<(u32, u32)>,
}

impl RequestFingerprint {
    /// Find a header value, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == lower)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Header names, lowercased, in arrival order.
    pub fn header_names(&self) -> Vec<String> {
        self.headers.iter().map(|(k, _)| k.to_lowercase()).collect()
    }

    /// Path segments, empty segments dropped.
    pub fn path_segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Structural path rendering with digit runs collapsed — safe to hand to
    /// the escalation prompt without leaking identifiers.
    pub fn path_skeleton(&self) -> String {
        let mut out = String::with_capacity(self.path.len());
        let mut in_digits = false;
        for ch in self.path.chars() {
            if ch.is_ascii_digit() {
                if !in_digits {
                    out.push('N');
                    in_digits = true;
                }
            } else {
                in_digits = false;
                out.push(ch);
            }
        }
        out
    }

    /// Minimal fingerprint for unit fixtures.
    #[doc(hidden)]
    pub fn synthetic(user_agent: &str, path: &str) -> Self {
        Self {
            method: "GET".into(),
            path: path.into(),
            user_agent: user_agent.trim().into(),
            remote_addr: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)),
            headers: Vec::new(),
            tls: None,
            alpn: None,
            tcp: None,
            h2: None,
            client_features: None,
        }
    }
}
