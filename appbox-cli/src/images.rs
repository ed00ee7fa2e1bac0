//! Local image directory and remote release catalog.
//!
//! Release repositories are plain HTTP directory listings; images are
//! discovered by scanning anchor `href` attributes in the index page and
//! filtering by the stream's disk extension. Downloads stream straight to
//! the image directory with a progress bar.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use appbox_hypervisor::Stream;

use crate::config::RepositoriesConfig;

/// Local image directory plus the remote catalogs it pulls from.
pub struct ImageStore {
    images_dir: PathBuf,
    repositories: RepositoriesConfig,
    agent: ureq::Agent,
}

impl ImageStore {
    pub fn new(images_dir: PathBuf, repositories: RepositoriesConfig) -> Self {
        Self {
            images_dir,
            repositories,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    pub fn images_dir(&self) -> &PathBuf {
        &self.images_dir
    }

    /// Absolute path an image would occupy locally.
    pub fn image_path(&self, name: &str) -> PathBuf {
        self.images_dir.join(name)
    }

    /// The listing URL for a stream.
    ///
    /// Enterprise builds are grouped by `major.minor` release directories
    /// under the repository root, so listing them needs a version.
    fn listing_url(&self, stream: Stream, version: Option<&str>) -> Result<String> {
        match stream {
            Stream::Community => {
                let url = &self.repositories.community.url;
                if url.is_empty() {
                    bail!("No community repository URL configured");
                }
                Ok(url.clone())
            }
            Stream::Enterprise => {
                let url = &self.repositories.enterprise.url;
                if url.is_empty() {
                    bail!("No enterprise repository URL configured");
                }
                let version = version
                    .context("Enterprise listings need a version (e.g. --version 5.11)")?;
                Ok(format!(
                    "{}/builds/cfme/{}/stable",
                    url.trim_end_matches('/'),
                    major_minor(version)
                ))
            }
        }
    }

    /// Images available in the stream's remote repository.
    pub fn remote_images(&self, stream: Stream, version: Option<&str>) -> Result<Vec<String>> {
        let url = self.listing_url(stream, version)?;
        debug!(%url, "Fetching image listing");

        let response = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("Failed to fetch image listing from {url}"))?;
        let mut body = String::new();
        response
            .into_body()
            .into_reader()
            .read_to_string(&mut body)
            .with_context(|| format!("Failed to read image listing from {url}"))?;

        let extension = format!(".{}", stream.disk_format());
        let mut names: Vec<String> = extract_hrefs(&body)
            .into_iter()
            .filter(|name| name.ends_with(&extension))
            .filter(|name| version.map_or(true, |v| name.contains(v)))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Images present in the local directory, optionally restricted to a
    /// stream and version.
    pub fn local_images(
        &self,
        stream: Option<Stream>,
        version: Option<&str>,
    ) -> Result<Vec<String>> {
        if !self.images_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.images_dir)
            .with_context(|| format!("Failed to read {}", self.images_dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if let Some(stream) = stream {
                if !name.ends_with(&format!(".{}", stream.disk_format())) {
                    continue;
                }
                // Community builds all carry the manageiq prefix.
                if stream == Stream::Community && !name.contains("manageiq") {
                    continue;
                }
            }
            if let Some(version) = version {
                if !name.contains(version) {
                    continue;
                }
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Download `name` from its stream's repository into the image
    /// directory. Already-downloaded images are left untouched.
    pub fn download(&self, name: &str) -> Result<PathBuf> {
        let destination = self.image_path(name);
        if destination.exists() {
            info!(image = name, "Image already downloaded");
            return Ok(destination);
        }

        let (stream, version) = parse_image_name(name);
        let url = format!("{}/{}", self.listing_url(stream, version)?, name);
        info!(%url, "Downloading image");

        let response = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("Failed to download {url}"))?;
        let total = response
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        fs::create_dir_all(&self.images_dir)
            .with_context(|| format!("Failed to create {}", self.images_dir.display()))?;

        let bar = progress_bar(name, total);
        let mut reader = bar.wrap_read(response.into_body().into_reader());
        let mut file = File::create(&destination)
            .with_context(|| format!("Failed to create {}", destination.display()))?;

        let copied = io::copy(&mut reader, &mut file);
        bar.finish();
        if let Err(e) = copied {
            // A partial image would shadow the remote copy on retry.
            let _ = fs::remove_file(&destination);
            return Err(anyhow::Error::from(e).context(format!("Download of {name} failed")));
        }

        Ok(destination)
    }

    /// Delete a local image.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.image_path(name);
        fs::remove_file(&path).with_context(|| format!("No local image {name}"))?;
        info!(image = name, "Image removed");
        Ok(())
    }
}

fn progress_bar(name: &str, total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )
                .expect("valid template")
                .progress_chars("#>-"),
            );
            bar
        }
        None => ProgressBar::new_spinner(),
    };
    bar.set_message(name.to_string());
    bar
}

/// Restrict a listing to names containing `filter`.
///
/// Both listing modes, local and remote, pass their names through this
/// before display.
pub fn filter_names(names: Vec<String>, filter: Option<&str>) -> Vec<String> {
    match filter {
        Some(filter) => names
            .into_iter()
            .filter(|name| name.contains(filter))
            .collect(),
        None => names,
    }
}

/// Derive the stream and release version from an image file name.
///
/// Names follow `{prefix}-{provider}-{version}-...`; the leading
/// `manageiq` prefix marks community builds, anything else enterprise.
pub fn parse_image_name(name: &str) -> (Stream, Option<&str>) {
    let stream = Stream::from_image_name(name);
    let version = name.split('-').nth(2).filter(|v| !v.is_empty());
    (stream, version)
}

/// First two dotted components of a version: `5.11.0.1` becomes `5.11`.
fn major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

/// Pull anchor targets out of an HTML directory listing.
fn extract_hrefs(html: &str) -> Vec<String> {
    let mut hrefs = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find("href=") {
        rest = &rest[start + "href=".len()..];
        let Some(quote) = rest.chars().next() else { break };
        if quote != '"' && quote != '\'' {
            continue;
        }
        rest = &rest[1..];
        let Some(end) = rest.find(quote) else { break };
        hrefs.push(rest[..end].to_string());
        rest = &rest[end + 1..];
    }
    hrefs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    /// Serves canned GET responses from a path map.
    struct MockServer {
        addr: String,
        _handle: std::thread::JoinHandle<()>,
    }

    impl MockServer {
        fn start(pages: HashMap<String, Vec<u8>>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = format!("http://{}", listener.local_addr().unwrap());
            let pages = Arc::new(Mutex::new(pages));

            let handle = std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    let pages = Arc::clone(&pages);

                    std::thread::spawn(move || {
                        let mut reader = BufReader::new(stream.try_clone().unwrap());
                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).is_err() {
                            return;
                        }
                        let path = request_line
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or("/")
                            .to_owned();
                        loop {
                            let mut line = String::new();
                            if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
                                break;
                            }
                        }

                        let pages = pages.lock().unwrap();
                        let response = match pages.get(&path) {
                            Some(body) => {
                                let mut response = format!(
                                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                                    body.len()
                                )
                                .into_bytes();
                                response.extend_from_slice(body);
                                response
                            }
                            None => {
                                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                                    .to_vec()
                            }
                        };
                        let _ = stream.write_all(&response);
                        let _ = stream.flush();
                    });
                }
            });

            MockServer { addr, _handle: handle }
        }
    }

    fn store_at(dir: &tempfile::TempDir, community_url: &str) -> ImageStore {
        let mut repositories = RepositoriesConfig::default();
        repositories.community.url = community_url.to_string();
        ImageStore::new(dir.path().to_path_buf(), repositories)
    }

    const LISTING: &str = r#"
        <html><body>
        <a href="../">Parent</a>
        <a href="manageiq-ovirt-jansa-1.qc2">manageiq-ovirt-jansa-1.qc2</a>
        <a href="manageiq-kvm-petrosian-2.qc2">manageiq-kvm-petrosian-2.qc2</a>
        <a href="manageiq-kvm-petrosian-2.qc2.sha256">checksum</a>
        <a href='release-notes.html'>notes</a>
        </body></html>
    "#;

    #[test]
    fn hrefs_are_extracted_from_both_quote_styles() {
        let hrefs = extract_hrefs(LISTING);
        assert!(hrefs.contains(&"manageiq-ovirt-jansa-1.qc2".to_string()));
        assert!(hrefs.contains(&"release-notes.html".to_string()));
        assert_eq!(hrefs.len(), 5);
    }

    #[test]
    fn remote_listing_filters_by_extension_and_version() {
        let mut pages = HashMap::new();
        pages.insert("/".to_string(), LISTING.as_bytes().to_vec());
        let server = MockServer::start(pages);
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, &server.addr);

        let all = store.remote_images(Stream::Community, None).unwrap();
        assert_eq!(
            all,
            vec!["manageiq-kvm-petrosian-2.qc2", "manageiq-ovirt-jansa-1.qc2"]
        );

        let filtered = store
            .remote_images(Stream::Community, Some("petrosian"))
            .unwrap();
        assert_eq!(filtered, vec!["manageiq-kvm-petrosian-2.qc2"]);
    }

    #[test]
    fn name_filter_prunes_remote_listings() {
        let mut pages = HashMap::new();
        pages.insert("/".to_string(), LISTING.as_bytes().to_vec());
        let server = MockServer::start(pages);
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, &server.addr);

        let names = store.remote_images(Stream::Community, None).unwrap();
        assert_eq!(names.len(), 2);

        let filtered = filter_names(names.clone(), Some("jansa"));
        assert_eq!(filtered, vec!["manageiq-ovirt-jansa-1.qc2"]);

        assert!(filter_names(names.clone(), Some("donkey")).is_empty());
        assert_eq!(filter_names(names.clone(), None), names);
    }

    #[test]
    fn enterprise_listing_url_includes_major_minor() {
        let dir = tempfile::tempdir().unwrap();
        let mut repositories = RepositoriesConfig::default();
        repositories.enterprise.url = "http://repo.example/".to_string();
        let store = ImageStore::new(dir.path().to_path_buf(), repositories);

        let url = store
            .listing_url(Stream::Enterprise, Some("5.11.0.1"))
            .unwrap();
        assert_eq!(url, "http://repo.example/builds/cfme/5.11/stable");

        // Version is mandatory for enterprise.
        assert!(store.listing_url(Stream::Enterprise, None).is_err());
    }

    #[test]
    fn download_streams_to_the_image_directory() {
        let body = vec![0xABu8; 4096];
        let mut pages = HashMap::new();
        pages.insert("/".to_string(), LISTING.as_bytes().to_vec());
        pages.insert("/manageiq-ovirt-jansa-1.qc2".to_string(), body.clone());
        let server = MockServer::start(pages);
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, &server.addr);

        let path = store.download("manageiq-ovirt-jansa-1.qc2").unwrap();
        let mut downloaded = Vec::new();
        File::open(&path)
            .unwrap()
            .read_to_end(&mut downloaded)
            .unwrap();
        assert_eq!(downloaded, body);
    }

    #[test]
    fn download_skips_images_already_present() {
        // No server at all: a present file must short-circuit the fetch.
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, "http://127.0.0.1:1");
        fs::write(dir.path().join("manageiq-ovirt-jansa-1.qc2"), b"cached").unwrap();

        let path = store.download("manageiq-ovirt-jansa-1.qc2").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"cached");
    }

    #[test]
    fn local_listing_applies_stream_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, "");
        fs::write(dir.path().join("manageiq-ovirt-jansa-1.qc2"), b"x").unwrap();
        fs::write(dir.path().join("cfme-rhevm-5.11.0.1-1.qcow2"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let all = store.local_images(None, None).unwrap();
        assert_eq!(all.len(), 3);

        let community = store.local_images(Some(Stream::Community), None).unwrap();
        assert_eq!(community, vec!["manageiq-ovirt-jansa-1.qc2"]);

        let enterprise = store
            .local_images(Some(Stream::Enterprise), Some("5.11"))
            .unwrap();
        assert_eq!(enterprise, vec!["cfme-rhevm-5.11.0.1-1.qcow2"]);

        let filtered = filter_names(all, Some("jansa"));
        assert_eq!(filtered, vec!["manageiq-ovirt-jansa-1.qc2"]);
    }

    #[test]
    fn remove_errors_on_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, "");
        fs::write(dir.path().join("manageiq-ovirt-jansa-1.qc2"), b"x").unwrap();

        store.remove("manageiq-ovirt-jansa-1.qc2").unwrap();
        assert!(store.remove("manageiq-ovirt-jansa-1.qc2").is_err());
    }

    #[test]
    fn image_names_carry_stream_and_version() {
        let (stream, version) = parse_image_name("cfme-rhevm-5.11.0.1-1.x86_64.qcow2");
        assert_eq!(stream, Stream::Enterprise);
        assert_eq!(version, Some("5.11.0.1"));

        let (stream, _) = parse_image_name("manageiq-ovirt-jansa-1.qc2");
        assert_eq!(stream, Stream::Community);

        assert_eq!(major_minor("5.11.0.1"), "5.11");
        assert_eq!(major_minor("5.9"), "5.9");
    }
}
