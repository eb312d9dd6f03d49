//! First-run fetch of the face mesh model.
//!
//! `detector.model_url` may point at an http(s) location or at a local file
//! (`file://` or a plain path), which is handy for offline machines that carry
//! the model on removable media.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelDownloadEvent {
    AlreadyPresent,
    Started { total: Option<u64> },
    Progress { downloaded: u64, total: Option<u64> },
    Finished,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ModelSource {
    Remote(String),
    Local(PathBuf),
}

impl ModelSource {
    fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ModelSource::Remote(location.to_string())
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            ModelSource::Local(PathBuf::from(path))
        }
    }
}

/// Make sure the face mesh model exists at `model_path`, fetching it from
/// `url` on first use.
pub fn ensure_face_model_ready<F>(
    model_path: &Path,
    url: Option<&str>,
    mut on_event: F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if model_path.exists() {
        on_event(ModelDownloadEvent::AlreadyPresent);
        on_event(ModelDownloadEvent::Finished);
        return Ok(());
    }

    let location = url.ok_or_else(|| {
        anyhow!(
            "face mesh model {} not found and detector.model_url is not set",
            model_path.display()
        )
    })?;
    if let Some(dir) = model_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create model directory {}", dir.display()))?;
    }

    let mut bar: Option<ProgressBar> = None;
    let mut report = |event: ModelDownloadEvent| {
        match &event {
            ModelDownloadEvent::Started { total } => bar = Some(progress_bar_for(*total)),
            ModelDownloadEvent::Progress { downloaded, .. } => {
                if let Some(bar) = &bar {
                    bar.set_position(*downloaded);
                }
            }
            ModelDownloadEvent::Finished => {
                if let Some(bar) = bar.take() {
                    bar.finish_with_message("face mesh model ready");
                }
            }
            ModelDownloadEvent::AlreadyPresent => {}
        }
        on_event(event);
    };

    let staged = partial_path(model_path);
    let fetched = match ModelSource::parse(location) {
        ModelSource::Remote(url) => fetch_remote(&url, &staged, &mut report),
        ModelSource::Local(source) => copy_local(&source, &staged, &mut report),
    };
    if let Err(err) = fetched {
        // Never leave a half-written file that a later run could pick up.
        let _ = fs::remove_file(&staged);
        return Err(err).with_context(|| format!("failed to fetch face mesh model from {location}"));
    }

    fs::rename(&staged, model_path).with_context(|| {
        format!("failed to move {} to {}", staged.display(), model_path.display())
    })?;
    log::info!("face mesh model stored at {}", model_path.display());
    report(ModelDownloadEvent::Finished);
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn fetch_remote(
    url: &str,
    staged: &Path,
    report: &mut dyn FnMut(ModelDownloadEvent),
) -> anyhow::Result<()> {
    log::info!("downloading face mesh model from {url}");
    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build http client")?;
    let mut response = client
        .get(url)
        .send()
        .context("request failed")?
        .error_for_status()
        .context("server rejected the request")?;

    let total = response.content_length();
    report(ModelDownloadEvent::Started { total });
    write_staged(&mut response, staged, total, report)
}

fn copy_local(
    source: &Path,
    staged: &Path,
    report: &mut dyn FnMut(ModelDownloadEvent),
) -> anyhow::Result<()> {
    log::info!("copying face mesh model from {}", source.display());
    let mut input =
        fs::File::open(source).with_context(|| format!("cannot open {}", source.display()))?;
    let total = input.metadata().ok().map(|meta| meta.len());
    report(ModelDownloadEvent::Started { total });
    write_staged(&mut input, staged, total, report)
}

fn write_staged(
    input: &mut dyn io::Read,
    staged: &Path,
    total: Option<u64>,
    report: &mut dyn FnMut(ModelDownloadEvent),
) -> anyhow::Result<()> {
    let file =
        fs::File::create(staged).with_context(|| format!("cannot create {}", staged.display()))?;
    let mut writer = ReportingWriter {
        inner: file,
        written: 0,
        total,
        report,
    };
    io::copy(input, &mut writer).context("transfer interrupted")?;
    writer.inner.sync_all().context("failed to flush model to disk")?;
    Ok(())
}

/// Forwards writes and reports the running byte count after each chunk.
struct ReportingWriter<'a, W> {
    inner: W,
    written: u64,
    total: Option<u64>,
    report: &'a mut dyn FnMut(ModelDownloadEvent),
}

impl<W: Write> Write for ReportingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        (self.report)(ModelDownloadEvent::Progress {
            downloaded: self.written,
            total: self.total,
        });
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn progress_bar_for(total: Option<u64>) -> ProgressBar {
    let Some(total) = total.filter(|&t| t > 0) else {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} fetching face mesh model {bytes}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        return bar;
    };

    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} face mesh [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    ) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tryon-{}-{name}", std::process::id()))
    }

    #[test]
    fn existing_model_is_not_fetched() {
        let path = scratch("present.onnx");
        fs::write(&path, b"onnx").unwrap();

        let mut events = Vec::new();
        ensure_face_model_ready(&path, None, |evt| events.push(evt)).unwrap();
        assert_eq!(events, [ModelDownloadEvent::AlreadyPresent, ModelDownloadEvent::Finished]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_model_without_url_fails() {
        let path = scratch("missing/face.onnx");
        let err = ensure_face_model_ready(&path, None, |_| {}).unwrap_err();
        assert!(err.to_string().contains("model_url"));
    }

    #[test]
    fn local_source_is_copied_into_place() {
        let source = scratch("seed.onnx");
        fs::write(&source, vec![7u8; 4096]).unwrap();
        let dest = scratch("copied/face.onnx");
        let url = format!("file://{}", source.display());

        let mut events = Vec::new();
        ensure_face_model_ready(&dest, Some(&url), |evt| events.push(evt)).unwrap();

        assert_eq!(fs::read(&dest).unwrap().len(), 4096);
        assert!(!partial_path(&dest).exists());
        assert_eq!(events.first(), Some(&ModelDownloadEvent::Started { total: Some(4096) }));
        assert_eq!(events.last(), Some(&ModelDownloadEvent::Finished));
        assert!(events.contains(&ModelDownloadEvent::Progress {
            downloaded: 4096,
            total: Some(4096)
        }));

        fs::remove_file(&source).unwrap();
        fs::remove_dir_all(dest.parent().unwrap()).unwrap();
    }

    #[test]
    fn failed_copy_leaves_nothing_behind() {
        let dest = scratch("failed/face.onnx");
        let missing = scratch("no-such-seed.onnx");
        let err = ensure_face_model_ready(&dest, missing.to_str(), |_| {}).unwrap_err();
        assert!(format!("{err:#}").contains("cannot open"));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
        let _ = fs::remove_dir_all(dest.parent().unwrap());
    }

    #[test]
    fn sources_are_classified_by_scheme() {
        assert_eq!(
            ModelSource::parse("https://example.com/face.onnx"),
            ModelSource::Remote("https://example.com/face.onnx".to_string())
        );
        assert_eq!(
            ModelSource::parse("file:///opt/models/face.onnx"),
            ModelSource::Local(PathBuf::from("/opt/models/face.onnx"))
        );
        assert_eq!(
            ModelSource::parse("models/face.onnx"),
            ModelSource::Local(PathBuf::from("models/face.onnx"))
        );
    }
}
