//! Release-feed client for Piri's installer (spec §4.4, §6).
//!
//! Resolves the latest published version, selects the asset matching the
//! host's `{os, arch}` by *name*, downloads both the asset and its
//! checksum manifest, verifies the asset against the manifest, and
//! extracts the embedded binary from the archive — before the installer
//! ever touches the on-disk layout. Semantic-version comparison decides
//! whether an update is needed at all (spec §8 testable property 6: "With
//! current `1.10.0` and latest `1.9.9`, `needs_update = false`").
//!
//! Download verification is not optional (spec §4.4): if the checksum
//! manifest has no entry for the selected asset, [`resolve_release`]
//! aborts rather than applying an unsigned update.

use std::collections::HashMap;
use std::io::Read;

use anyhow::{Context, Result, bail};
use piri_environment::Platform;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const USER_AGENT: &str = concat!("piri-release/", env!("CARGO_PKG_VERSION"));

/// One entry in a GitHub-style release feed's asset list (spec §6: `{name,
/// browser_download_url}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// The release feed's JSON shape: `{tag_name, assets: [...]}` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Parses `tag_name` as a semantic version, tolerating a leading `v`
    /// (the common tag convention `v1.2.3`).
    pub fn version(&self) -> Result<Version> {
        let stripped = self.tag_name.strip_prefix('v').unwrap_or(&self.tag_name);
        Version::parse(stripped)
            .with_context(|| format!("release tag {:?} is not a valid semver", self.tag_name))
    }
}

/// Whether `latest` represents an upgrade over `current` (plain semver
/// comparison; pre-release/build metadata follow semver precedence rules).
pub fn needs_update(current: &Version, latest: &Version) -> bool {
    latest > current
}

/// Picks the release asset matching `platform` by name, following the
/// spec's exact convention (§6): Linux assets contain `linux` and one of
/// `amd64`/`arm64` and end in `.tar.gz`; macOS publishes one universal
/// `mac_os_all` asset ending in `.zip`. Platforms outside that set are an
/// open question the spec leaves to the implementer (§9) — this rejects
/// them with a clear error rather than guessing.
pub fn select_platform_asset<'a>(
    assets: &'a [ReleaseAsset],
    platform: &Platform,
) -> Result<&'a ReleaseAsset> {
    let os_family = platform
        .release_os_family()
        .ok_or_else(|| anyhow::anyhow!("no release asset selector for platform {}", platform))?;

    let matches = |name: &str| -> bool {
        let name = name.to_ascii_lowercase();
        match os_family {
            "linux" => {
                let arch = platform.release_arch_token().unwrap_or("amd64");
                name.contains("linux") && name.contains(arch) && name.ends_with(".tar.gz")
            }
            "mac_os_all" => name.contains("mac_os_all") && name.ends_with(".zip"),
            _ => false,
        }
    };

    assets.iter().find(|a| matches(&a.name)).ok_or_else(|| {
        let available: Vec<&str> = assets.iter().map(|a| a.name.as_str()).collect();
        anyhow::anyhow!(
            "no release asset matches platform {} (available: {})",
            platform,
            available.join(", ")
        )
    })
}

/// Picks the checksum-manifest asset: the one whose name contains
/// `checksums.txt` (spec §6).
pub fn select_checksum_asset<'a>(assets: &'a [ReleaseAsset]) -> Result<&'a ReleaseAsset> {
    assets
        .iter()
        .find(|a| a.name.contains("checksums.txt"))
        .ok_or_else(|| anyhow::anyhow!("release has no checksums.txt asset"))
}

/// A parsed `sha256sum`-style checksum manifest: `<hex digest>  <filename>`
/// per line.
#[derive(Debug, Clone, Default)]
pub struct ChecksumManifest {
    digests: HashMap<String, String>,
}

impl ChecksumManifest {
    pub fn parse(content: &str) -> Result<Self> {
        let mut digests = HashMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let digest = parts.next().unwrap_or_default();
            let filename = parts.next().unwrap_or_default().trim_start_matches(['*', ' ']);
            if digest.is_empty() || filename.is_empty() {
                bail!("malformed checksum manifest line {}: {:?}", lineno + 1, line);
            }
            digests.insert(filename.to_string(), digest.to_ascii_lowercase());
        }
        Ok(Self { digests })
    }

    pub fn expected_digest(&self, filename: &str) -> Option<&str> {
        self.digests.get(filename).map(String::as_str)
    }
}

/// Computes the lowercase-hex sha256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Verifies `data` against an expected lowercase-hex sha256 digest.
pub fn verify_checksum(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        bail!("checksum mismatch: expected {}, got {}", expected_hex, actual)
    }
}

/// The archive format a selected asset is packed in, inferred from its
/// file extension (spec §4.4 step 6: "tar+gzip on Linux-family, zip on
/// macOS-family").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn for_asset_name(name: &str) -> Result<Self> {
        if name.ends_with(".tar.gz") {
            Ok(ArchiveKind::TarGz)
        } else if name.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else {
            bail!("unrecognized archive extension for asset {:?}", name)
        }
    }
}

/// Extracts `binary_name` from an in-memory archive of the given kind.
/// Matches on the entry's file name (ignoring any leading directory
/// components the archive may bundle it under).
pub fn extract_binary(bytes: &[u8], kind: ArchiveKind, binary_name: &str) -> Result<Vec<u8>> {
    match kind {
        ArchiveKind::TarGz => extract_from_tar_gz(bytes, binary_name),
        ArchiveKind::Zip => extract_from_zip(bytes, binary_name),
    }
}

fn extract_from_tar_gz(bytes: &[u8], binary_name: &str) -> Result<Vec<u8>> {
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries().context("failed to read tar archive")? {
        let mut entry = entry.context("failed to read tar entry")?;
        let path = entry.path().context("failed to read tar entry path")?.into_owned();
        if path.file_name().map(|f| f == binary_name).unwrap_or(false) {
            let mut out = Vec::new();
            entry.read_to_end(&mut out).context("failed to read tar entry contents")?;
            return Ok(out);
        }
    }
    bail!("binary {:?} not found in tar.gz archive", binary_name)
}

fn extract_from_zip(bytes: &[u8], binary_name: &str) -> Result<Vec<u8>> {
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader).context("failed to read zip archive")?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).context("failed to read zip entry")?;
        let matches = std::path::Path::new(file.name())
            .file_name()
            .map(|f| f == binary_name)
            .unwrap_or(false);
        if matches {
            let mut out = Vec::new();
            file.read_to_end(&mut out).context("failed to read zip entry contents")?;
            return Ok(out);
        }
    }
    bail!("binary {:?} not found in zip archive", binary_name)
}

/// HTTP client for a release feed plus the download-and-verify pipeline the
/// installer drives.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    feed_url: String,
}

impl ReleaseClient {
    pub fn new(feed_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build release HTTP client")?;
        Ok(Self { http, feed_url: feed_url.into() })
    }

    /// Fetches the latest release object from the feed (spec §6: a single
    /// JSON object, not a list — the feed already reports "latest").
    pub async fn fetch_latest(&self) -> Result<Release> {
        let response = self
            .http
            .get(&self.feed_url)
            .send()
            .await
            .with_context(|| format!("failed to fetch release feed {}", self.feed_url))?;

        if !response.status().is_success() {
            bail!("release feed returned status {}", response.status());
        }

        response.json().await.context("failed to parse release feed response")
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to download {}", url))?;
        if !response.status().is_success() {
            bail!("download of {} returned status {}", url, response.status());
        }
        Ok(response.bytes().await.with_context(|| format!("failed to read body of {}", url))?.to_vec())
    }

    /// Runs the full resolve-download-verify-extract pipeline for
    /// `release` on `platform` (spec §4.4 step 6): select the platform
    /// asset and the checksum manifest, download both, verify the asset
    /// against the manifest (aborting if no entry exists for it), and
    /// extract `binary_name` from the archive.
    pub async fn resolve_release(
        &self,
        release: &Release,
        platform: &Platform,
        binary_name: &str,
    ) -> Result<Vec<u8>> {
        let asset = select_platform_asset(&release.assets, platform)?;
        let checksum_asset = select_checksum_asset(&release.assets)?;

        let asset_bytes = self.download(&asset.browser_download_url).await?;
        let checksum_text = self.download(&checksum_asset.browser_download_url).await?;
        let checksum_text = String::from_utf8(checksum_text)
            .context("checksum manifest is not valid UTF-8")?;
        let manifest = ChecksumManifest::parse(&checksum_text)?;

        let expected = manifest.expected_digest(&asset.name).ok_or_else(|| {
            anyhow::anyhow!("checksum manifest has no entry for asset {:?}; refusing to apply unsigned update", asset.name)
        })?;
        verify_checksum(&asset_bytes, expected)?;

        let kind = ArchiveKind::for_asset_name(&asset.name)?;
        extract_binary(&asset_bytes, kind, binary_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(os: &str, arch: &str) -> Platform {
        Platform { os: os.to_string(), arch: arch.to_string() }
    }

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset { name: name.to_string(), browser_download_url: format!("https://example.com/{name}") }
    }

    #[test]
    fn needs_update_true_when_latest_is_newer() {
        assert!(needs_update(&Version::parse("1.9.9").unwrap(), &Version::parse("1.10.0").unwrap()));
    }

    #[test]
    fn needs_update_false_when_current_is_newer() {
        assert!(!needs_update(&Version::parse("1.10.0").unwrap(), &Version::parse("1.9.9").unwrap()));
    }

    #[test]
    fn needs_update_false_when_equal() {
        let v = Version::parse("2.0.0").unwrap();
        assert!(!needs_update(&v, &v));
    }

    #[test]
    fn release_version_strips_leading_v() {
        let release = Release { tag_name: "v1.2.3".to_string(), assets: vec![] };
        assert_eq!(release.version().unwrap(), Version::parse("1.2.3").unwrap());
    }

    #[test]
    fn select_platform_asset_picks_linux_amd64_tar_gz() {
        let assets = vec![
            asset("piri_linux_amd64.tar.gz"),
            asset("piri_linux_arm64.tar.gz"),
            asset("piri_mac_os_all.zip"),
            asset("piri_checksums.txt"),
        ];
        let selected = select_platform_asset(&assets, &platform("linux", "x86_64")).unwrap();
        assert_eq!(selected.name, "piri_linux_amd64.tar.gz");
    }

    #[test]
    fn select_platform_asset_picks_mac_os_all_zip() {
        let assets = vec![asset("piri_linux_amd64.tar.gz"), asset("piri_mac_os_all.zip")];
        let selected = select_platform_asset(&assets, &platform("macos", "aarch64")).unwrap();
        assert_eq!(selected.name, "piri_mac_os_all.zip");
    }

    #[test]
    fn select_platform_asset_errors_with_available_names_listed() {
        let assets = vec![asset("piri_linux_amd64.tar.gz")];
        let err = select_platform_asset(&assets, &platform("windows", "x86_64")).unwrap_err();
        assert!(err.to_string().contains("no release asset selector"));
    }

    #[test]
    fn select_checksum_asset_finds_manifest() {
        let assets = vec![asset("piri_linux_amd64.tar.gz"), asset("piri_checksums.txt")];
        let selected = select_checksum_asset(&assets).unwrap();
        assert_eq!(selected.name, "piri_checksums.txt");
    }

    #[test]
    fn checksum_manifest_parses_sha256sum_format() {
        let content = "deadbeef  piri_linux_amd64.tar.gz\ncafebabe  piri_mac_os_all.zip\n";
        let manifest = ChecksumManifest::parse(content).unwrap();
        assert_eq!(manifest.expected_digest("piri_linux_amd64.tar.gz"), Some("deadbeef"));
        assert_eq!(manifest.expected_digest("piri_mac_os_all.zip"), Some("cafebabe"));
        assert_eq!(manifest.expected_digest("missing"), None);
    }

    #[test]
    fn checksum_manifest_rejects_malformed_lines() {
        assert!(ChecksumManifest::parse("not-a-valid-line").is_err());
    }

    #[test]
    fn verify_checksum_detects_mismatch() {
        let data = b"hello world";
        let digest = sha256_hex(data);
        assert!(verify_checksum(data, &digest).is_ok());
        assert!(verify_checksum(data, "0000").is_err());
    }

    #[test]
    fn archive_kind_inferred_from_extension() {
        assert_eq!(ArchiveKind::for_asset_name("piri_linux_amd64.tar.gz").unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::for_asset_name("piri_mac_os_all.zip").unwrap(), ArchiveKind::Zip);
        assert!(ArchiveKind::for_asset_name("piri.exe").is_err());
    }

    #[test]
    fn extract_binary_finds_entry_in_tar_gz() {
        use std::io::Write;
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let data = b"#!/bin/sh\necho hi\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, "piri", &data[..]).unwrap();
            builder.finish().unwrap();
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let extracted = extract_binary(&gz_bytes, ArchiveKind::TarGz, "piri").unwrap();
        assert_eq!(extracted, b"#!/bin/sh\necho hi\n");
    }

    #[test]
    fn extract_binary_errors_when_entry_missing() {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let data = b"data";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append_data(&mut header, "not-the-binary", &data[..]).unwrap();
            builder.finish().unwrap();
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        use std::io::Write;
        encoder.write_all(&tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();

        assert!(extract_binary(&gz_bytes, ArchiveKind::TarGz, "piri").is_err());
    }

    #[tokio::test]
    async fn resolve_release_downloads_verifies_and_extracts() {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let data = b"binary-contents";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, "piri", &data[..]).unwrap();
            builder.finish().unwrap();
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        use std::io::Write;
        encoder.write_all(&tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();
        let digest = sha256_hex(&gz_bytes);

        let asset_server = run_test_server(gz_bytes).await;
        let checksum_content = format!("{digest}  piri_linux_amd64.tar.gz\n");
        let checksum_server = run_test_server(checksum_content.into_bytes()).await;

        let release = Release {
            tag_name: "v1.0.0".to_string(),
            assets: vec![
                ReleaseAsset { name: "piri_linux_amd64.tar.gz".to_string(), browser_download_url: asset_server },
                ReleaseAsset { name: "piri_checksums.txt".to_string(), browser_download_url: checksum_server },
            ],
        };

        let client = ReleaseClient::new("http://unused").unwrap();
        let extracted =
            client.resolve_release(&release, &platform("linux", "x86_64"), "piri").await.unwrap();
        assert_eq!(extracted, b"binary-contents");
    }

    #[tokio::test]
    async fn resolve_release_aborts_when_checksum_entry_missing() {
        let asset_server = run_test_server(b"whatever".to_vec()).await;
        let checksum_server = run_test_server(b"deadbeef  some_other_file.tar.gz\n".to_vec()).await;

        let release = Release {
            tag_name: "v1.0.0".to_string(),
            assets: vec![
                ReleaseAsset { name: "piri_linux_amd64.tar.gz".to_string(), browser_download_url: asset_server },
                ReleaseAsset { name: "piri_checksums.txt".to_string(), browser_download_url: checksum_server },
            ],
        };

        let client = ReleaseClient::new("http://unused").unwrap();
        let err = client
            .resolve_release(&release, &platform("linux", "x86_64"), "piri")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refusing to apply unsigned update"));
    }

    /// Spins up a one-shot local HTTP server serving `body`, returning its URL.
    async fn run_test_server(body: Vec<u8>) -> String {
        use tokio::net::TcpListener;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }
}
