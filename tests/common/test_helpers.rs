use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use node_compat::registry::{ARTIFACT_TYPE, SPEC_MEDIA_TYPE, sha256_digest};
use node_compat::{CompatibilityGroup, CompatibilitySpec, MatchExpression, MatchOp, Rule};

/// Specification with a `gpu`-tagged group and an untagged group
pub const GPU_SPEC_YAML: &str = r#"
version: v1alpha1
compatibilities:
  - tags: ["gpu"]
    description: GPU nodes
    rules:
      - name: has-gpu
        matchFeatures:
          - feature: pci.device
            matchExpressions:
              class: {op: In, value: ["0300", "0302"]}
              vendor: {op: In, value: ["10de"]}
  - description: Baseline for every node
    rules:
      - name: min-kernel
        matchFeatures:
          - feature: kernel.version
            matchExpressions:
              major: {op: Gt, value: ["4"]}
"#;

pub fn group(tags: &[&str], rule_names: &[&str]) -> CompatibilityGroup {
    CompatibilityGroup {
        tags: tags.iter().map(|t| t.to_string()).collect(),
        description: None,
        rules: rule_names
            .iter()
            .map(|name| Rule {
                name: name.to_string(),
                ..Default::default()
            })
            .collect(),
    }
}

pub fn spec(groups: Vec<CompatibilityGroup>) -> CompatibilitySpec {
    CompatibilitySpec {
        version: Some("v1alpha1".to_string()),
        compatibilities: groups,
    }
}

/// Rule requiring `kernel.loadedmodule` to contain `module`
pub fn module_rule(name: &str, module: &str) -> Rule {
    let mut rule = Rule {
        name: name.to_string(),
        ..Default::default()
    };
    rule.match_features.push(node_compat::FeatureMatcherTerm {
        feature: "kernel.loadedmodule".to_string(),
        match_expressions: [(module.to_string(), MatchExpression::new(MatchOp::Exists, &[]))]
            .into_iter()
            .collect(),
        match_name: None,
    });
    rule
}

/// Temporary directory laid out like a host root
pub struct FakeHost {
    pub dir: TempDir,
}

impl FakeHost {
    /// Host with the mandatory files present and one NVIDIA GPU on the PCI bus
    pub fn gpu_node() -> Self {
        let host = Self {
            dir: TempDir::new().unwrap(),
        };
        host.write(
            "proc/cpuinfo",
            "processor\t: 0\nvendor_id\t: GenuineIntel\ncpu family\t: 6\nmodel\t\t: 85\nflags\t\t: fpu sse4_2 avx2 avx512f\n",
        );
        host.write("proc/sys/kernel/osrelease", "6.8.0-45-generic\n");
        host.write(
            "proc/modules",
            "nvidia 1234 0 - Live 0x0000000000000000\nkvm 5678 1 - Live 0x0000000000000000\n",
        );
        host.write("proc/sys/kernel/hostname", "worker-1\n");
        host.write("etc/os-release", "ID=ubuntu\nVERSION_ID=\"22.04\"\n");
        host.write("sys/bus/pci/devices/0000:01:00.0/class", "0x030200\n");
        host.write("sys/bus/pci/devices/0000:01:00.0/vendor", "0x10de\n");
        host.write("sys/bus/pci/devices/0000:01:00.0/device", "0x20b0\n");
        host
    }

    /// Host missing the mandatory kernel release file
    pub fn broken_node() -> Self {
        let host = Self {
            dir: TempDir::new().unwrap(),
        };
        host.write("proc/cpuinfo", "processor\t: 0\nflags\t\t: fpu\n");
        host
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

#[derive(Clone, Debug)]
pub struct CannedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CannedResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Minimal HTTP/1.1 server answering GET requests from a path -> response table
///
/// Query strings are ignored when matching. Unknown paths answer 404. Once a
/// token is required, `/v2/` requests without it answer 401 with a bearer
/// challenge whose realm is `/token` on the same server.
pub struct StaticRegistry {
    pub address: String,
    routes: Arc<Mutex<HashMap<String, Vec<CannedResponse>>>>,
    requests: Arc<Mutex<Vec<String>>>,
    required_token: Arc<Mutex<Option<String>>>,
}

impl StaticRegistry {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let routes: Arc<Mutex<HashMap<String, Vec<CannedResponse>>>> = Arc::default();
        let requests: Arc<Mutex<Vec<String>>> = Arc::default();
        let required_token: Arc<Mutex<Option<String>>> = Arc::default();

        let server_routes = routes.clone();
        let server_requests = requests.clone();
        let server_token = required_token.clone();
        let realm = format!("http://{}/token", address);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let routes = server_routes.clone();
                let requests = server_requests.clone();
                let required_token = server_token.clone();
                let realm = realm.clone();
                tokio::spawn(async move {
                    let mut buffer = Vec::new();
                    let mut chunk = [0u8; 4096];
                    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                        }
                    }

                    let request = String::from_utf8_lossy(&buffer);
                    let target = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let path = target.split('?').next().unwrap_or("/").to_string();
                    requests.lock().unwrap().push(target);

                    let authorization = request
                        .lines()
                        .skip(1)
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
                        .map(|(_, value)| value.trim().to_string());
                    let unauthorized = match required_token.lock().unwrap().as_deref() {
                        Some(token) if path.starts_with("/v2/") => {
                            authorization.as_deref() != Some(format!("Bearer {}", token).as_str())
                        }
                        _ => false,
                    };

                    let response = if unauthorized {
                        CannedResponse::status(401).with_header(
                            "WWW-Authenticate",
                            &format!(r#"Bearer realm="{}",service="static-registry""#, realm),
                        )
                    } else {
                        let mut routes = routes.lock().unwrap();
                        match routes.get_mut(&path) {
                            // Queued responses are served in order; the last one repeats.
                            Some(queue) if queue.len() > 1 => queue.remove(0),
                            Some(queue) => queue[0].clone(),
                            None => CannedResponse::status(404),
                        }
                    };

                    let mut head = format!(
                        "HTTP/1.1 {} Canned\r\nContent-Length: {}\r\nConnection: close\r\n",
                        response.status,
                        response.body.len()
                    );
                    for (name, value) in &response.headers {
                        head.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    head.push_str("\r\n");

                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&response.body).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            address,
            routes,
            requests,
            required_token,
        }
    }

    /// Reject `/v2/` requests that do not carry `Authorization: Bearer <token>`
    pub fn require_token(&self, token: &str) {
        *self.required_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn route(&self, path: &str, response: CannedResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(response);
    }

    /// Drop any queued responses for `path` and serve `response` instead
    pub fn replace(&self, path: &str, response: CannedResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), vec![response]);
    }

    /// Request targets (path and query) in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reference(&self, repository: &str, tag: &str) -> String {
        format!("{}/{}:{}", self.address, repository, tag)
    }
}

/// Digests of a published compatibility artifact
pub struct PublishedArtifact {
    pub image_digest: String,
    pub artifact_digest: String,
    pub spec_digest: String,
}

/// Publish `spec_yaml` as the compatibility artifact of `<repository>:<tag>`
///
/// With `referrers_api` false the registry only serves the referrers tag.
pub fn publish_artifact(
    registry: &StaticRegistry,
    repository: &str,
    tag: &str,
    spec_yaml: &str,
    referrers_api: bool,
) -> PublishedArtifact {
    let base = format!("/v2/{}", repository);

    let image_manifest = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","layers":[]}"#;
    let image_digest = sha256_digest(image_manifest);
    registry.route(
        &format!("{}/manifests/{}", base, tag),
        CannedResponse::ok(image_manifest.to_vec())
            .with_header("Docker-Content-Digest", &image_digest),
    );

    let spec_digest = sha256_digest(spec_yaml.as_bytes());
    registry.route(
        &format!("{}/blobs/{}", base, spec_digest),
        CannedResponse::ok(spec_yaml.as_bytes().to_vec()),
    );

    let artifact_manifest = format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","artifactType":"{}","config":{{"mediaType":"application/vnd.oci.empty.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2}},"layers":[{{"mediaType":"{}","digest":"{}","size":{}}}]}}"#,
        ARTIFACT_TYPE,
        SPEC_MEDIA_TYPE,
        spec_digest,
        spec_yaml.len()
    );
    let artifact_digest = sha256_digest(artifact_manifest.as_bytes());
    registry.route(
        &format!("{}/manifests/{}", base, artifact_digest),
        CannedResponse::ok(artifact_manifest.clone()),
    );

    let index = format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json","manifests":[{{"mediaType":"application/vnd.oci.image.manifest.v1+json","artifactType":"application/vnd.example.sbom.v1","digest":"sha256:{}","size":10}},{{"mediaType":"application/vnd.oci.image.manifest.v1+json","artifactType":"{}","digest":"{}","size":{}}}]}}"#,
        "0".repeat(64),
        ARTIFACT_TYPE,
        artifact_digest,
        artifact_manifest.len()
    );
    let index_path = if referrers_api {
        format!("{}/referrers/{}", base, image_digest)
    } else {
        format!("{}/manifests/{}", base, image_digest.replacen(':', "-", 1))
    };
    registry.route(&index_path, CannedResponse::ok(index));

    PublishedArtifact {
        image_digest,
        artifact_digest,
        spec_digest,
    }
}
