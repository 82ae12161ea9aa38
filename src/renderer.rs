//! HTML to PDF rendering through an external wkhtmltopdf process.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::options::{Orientation, RenderOptions};

const INPUT_FILE: &str = "input.html";
const OUTPUT_FILE: &str = "output.pdf";

/// One render: HTML, an optional base URL and layout options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub html: String,
    pub base_url: Option<String>,
    pub options: RenderOptions,
}

impl RenderRequest {
    /// Builds a request. Missing options become the documented defaults.
    pub fn new(html: impl Into<String>, base_url: Option<String>, options: Option<RenderOptions>) -> Self {
        Self {
            html: html.into(),
            base_url,
            options: options.unwrap_or_default().with_defaults(),
        }
    }
}

/// Renderer settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    pub wkhtmltopdf_path: PathBuf,
    pub timeout: Duration,
    /// When false the converter is told not to emit external links.
    pub allow_net: bool,
    pub allowlist_paths: Vec<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            wkhtmltopdf_path: PathBuf::from("wkhtmltopdf"),
            timeout: Duration::from_secs(30),
            allow_net: false,
            allowlist_paths: Vec::new(),
        }
    }
}

impl From<&Config> for RendererConfig {
    fn from(config: &Config) -> Self {
        Self {
            wkhtmltopdf_path: config.wkhtmltopdf_path.clone(),
            timeout: config.render_timeout,
            allow_net: config.allow_net,
            allowlist_paths: config.allowlist_paths.clone(),
        }
    }
}

/// Scratch directory owned by exactly one render. Removed on drop, whatever
/// the outcome.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("trykkeri-api-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.path().join(INPUT_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_FILE)
    }
}

/// A fully built converter command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Base URL for relative resources. Not forwarded by [`WkhtmltopdfBackend`].
    pub base_url: Option<String>,
}

/// What the converter process reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

/// Runs a converter invocation. The renderer owns deadlines and file
/// handling; a backend only executes and reports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<BackendOutput>;
}

/// Spawns the real wkhtmltopdf binary. The child is killed if the future
/// is dropped, so a deadline or a cancelled request never leaks a process.
#[derive(Debug, Clone, Copy, Default)]
pub struct WkhtmltopdfBackend;

#[async_trait]
impl RenderBackend for WkhtmltopdfBackend {
    async fn run(&self, invocation: &Invocation) -> io::Result<BackendOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(BackendOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: combined,
        })
    }
}

/// Converts HTML to PDF bytes.
#[derive(Clone)]
pub struct Renderer {
    config: RendererConfig,
    backend: Arc<dyn RenderBackend>,
}

impl Renderer {
    pub fn new(config: RendererConfig, backend: Arc<dyn RenderBackend>) -> Self {
        Self { config, backend }
    }

    /// Renders `request` to PDF bytes. Single attempt, no retries.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the HTML is blank (the converter is not started)
    /// - `Timeout` if the converter does not finish within the configured deadline
    /// - `PdfGeneration` if the converter fails or writes an empty file
    /// - `Internal` for workspace I/O failures
    pub async fn render(&self, request: &RenderRequest) -> ServiceResult<Vec<u8>> {
        if request.html.trim().is_empty() {
            return Err(ServiceError::invalid_input("HTML content cannot be empty"));
        }

        let workspace = Workspace::create()
            .map_err(|e| ServiceError::internal(format!("failed to create temp dir: {e}")))?;

        let input_path = workspace.input_path();
        let output_path = workspace.output_path();
        tokio::fs::write(&input_path, request.html.as_bytes())
            .await
            .map_err(|e| ServiceError::internal(format!("failed to write HTML: {e}")))?;

        let mut args = build_args(&request.options, self.config.allow_net, &self.config.allowlist_paths);
        args.push(input_path.to_string_lossy().into_owned());
        args.push(output_path.to_string_lossy().into_owned());

        let invocation = Invocation {
            program: self.config.wkhtmltopdf_path.clone(),
            args,
            working_dir: workspace.path().to_path_buf(),
            base_url: request.base_url.clone(),
        };

        debug!(
            html_bytes = request.html.len(),
            base_url = invocation.base_url.as_deref().unwrap_or(""),
            args = ?invocation.args,
            "Starting converter"
        );

        let result = tokio::time::timeout(self.config.timeout, self.backend.run(&invocation)).await;
        let output = match result {
            Err(_) => {
                warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Converter exceeded render timeout"
                );
                return Err(ServiceError::Timeout);
            }
            Ok(Err(e)) => {
                return Err(ServiceError::pdf_generation(format!(
                    "wkhtmltopdf failed to start: {e}"
                )));
            }
            Ok(Ok(output)) => output,
        };

        if !output.success {
            return Err(ServiceError::pdf_generation(format!(
                "wkhtmltopdf failed (exit {}): {}",
                output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                output.output
            )));
        }

        let data = tokio::fs::read(&output_path)
            .await
            .map_err(|e| ServiceError::internal(format!("failed to read PDF output: {e}")))?;
        if data.is_empty() {
            return Err(ServiceError::pdf_generation("generated PDF is empty"));
        }

        info!(pdf_bytes = data.len(), "Render complete");
        Ok(data)
    }
}

/// Builds the converter arguments for `options`, excluding the input and
/// output paths. Order is stable.
pub fn build_args(options: &RenderOptions, allow_net: bool, allowlist_paths: &[PathBuf]) -> Vec<String> {
    let mut args: Vec<String> = vec!["--quiet".into(), "--encoding".into(), "utf-8".into()];

    if let Some(page_size) = &options.page_size {
        args.push("--page-size".into());
        args.push(page_size.clone());
    }
    if let Some(dpi) = options.dpi {
        args.push("--dpi".into());
        args.push(dpi.to_string());
    }

    args.push("--orientation".into());
    args.push(options.orientation.unwrap_or(Orientation::Portrait).to_string());

    let margins = [
        ("--margin-top", options.margin_top_mm),
        ("--margin-right", options.margin_right_mm),
        ("--margin-bottom", options.margin_bottom_mm),
        ("--margin-left", options.margin_left_mm),
    ];
    for (flag, value) in margins {
        if let Some(mm) = value {
            args.push(flag.into());
            args.push(format!("{mm}mm"));
        }
    }

    if options.print_background != Some(false) {
        args.push("--print-media-type".into());
    }
    if options.grayscale == Some(true) {
        args.push("--grayscale".into());
    }

    if !allow_net {
        args.push("--disable-external-links".into());
    }
    for path in allowlist_paths {
        args.push("--allow".into());
        args.push(path.to_string_lossy().into_owned());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn renderer(backend: impl RenderBackend + 'static) -> Renderer {
        let config = RendererConfig {
            timeout: Duration::from_millis(200),
            ..RendererConfig::default()
        };
        Renderer::new(config, Arc::new(backend))
    }

    fn request(html: &str) -> RenderRequest {
        RenderRequest::new(html, None, None)
    }

    /// Mock backend that writes `pdf` to the output path and remembers the workspace.
    fn writing_backend(pdf: &'static [u8], seen: Arc<Mutex<Option<PathBuf>>>) -> MockRenderBackend {
        let mut backend = MockRenderBackend::new();
        backend.expect_run().times(1).returning(move |inv| {
            *seen.lock().unwrap() = Some(inv.working_dir.clone());
            let out = inv.args.last().unwrap();
            std::fs::write(out, pdf).unwrap();
            Ok(BackendOutput {
                success: true,
                exit_code: Some(0),
                output: String::new(),
            })
        });
        backend
    }

    #[test]
    fn test_default_args() {
        let args = build_args(&RenderOptions::defaults(), false, &[]);
        assert_eq!(
            args,
            strings(&[
                "--quiet",
                "--encoding",
                "utf-8",
                "--page-size",
                "A4",
                "--dpi",
                "300",
                "--orientation",
                "Portrait",
                "--margin-top",
                "10mm",
                "--margin-right",
                "10mm",
                "--margin-bottom",
                "10mm",
                "--margin-left",
                "10mm",
                "--print-media-type",
                "--disable-external-links",
            ])
        );
    }

    #[test]
    fn test_unset_fields_omitted() {
        let args = build_args(&RenderOptions::default(), true, &[]);
        assert_eq!(
            args,
            strings(&[
                "--quiet",
                "--encoding",
                "utf-8",
                "--orientation",
                "Portrait",
                "--print-media-type",
            ])
        );
    }

    #[test]
    fn test_overridden_args() {
        let options = RenderOptions {
            page_size: Some("Letter".into()),
            margin_left_mm: Some(0),
            print_background: Some(false),
            grayscale: Some(true),
            orientation: Some(Orientation::Landscape),
            ..Default::default()
        };
        let allow = vec![PathBuf::from("/srv/assets"), PathBuf::from("/srv/fonts")];
        let args = build_args(&options, true, &allow);
        assert_eq!(
            args,
            strings(&[
                "--quiet",
                "--encoding",
                "utf-8",
                "--page-size",
                "Letter",
                "--orientation",
                "Landscape",
                "--margin-left",
                "0mm",
                "--grayscale",
                "--allow",
                "/srv/assets",
                "--allow",
                "/srv/fonts",
            ])
        );
    }

    #[test]
    fn test_args_are_stable() {
        let options = RenderOptions::defaults();
        assert_eq!(build_args(&options, false, &[]), build_args(&options, false, &[]));
    }

    #[test]
    fn test_request_applies_defaults() {
        let req = RenderRequest::new("<p>x</p>", Some("https://example.com".into()), None);
        assert_eq!(req.options, RenderOptions::defaults());
        assert_eq!(req.base_url.as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn test_render_success_cleans_workspace() {
        let seen = Arc::new(Mutex::new(None));
        let renderer = renderer(writing_backend(b"%PDF-1.4 test", seen.clone()));

        let pdf = renderer.render(&request("<html><body>hi</body></html>")).await.unwrap();
        assert_eq!(pdf, b"%PDF-1.4 test");

        let dir = seen.lock().unwrap().clone().unwrap();
        assert!(!dir.exists(), "workspace should be removed");
    }

    #[tokio::test]
    async fn test_invocation_shape() {
        let mut backend = MockRenderBackend::new();
        backend
            .expect_run()
            .withf(|inv| {
                let n = inv.args.len();
                inv.program == PathBuf::from("wkhtmltopdf")
                    && inv.args[n - 2] == inv.working_dir.join("input.html").to_string_lossy()
                    && inv.args[n - 1] == inv.working_dir.join("output.pdf").to_string_lossy()
                    && std::fs::read_to_string(inv.working_dir.join("input.html")).unwrap()
                        == "<p>payload</p>"
            })
            .times(1)
            .returning(|inv| {
                std::fs::write(inv.working_dir.join("output.pdf"), b"%PDF").unwrap();
                Ok(BackendOutput {
                    success: true,
                    exit_code: Some(0),
                    output: String::new(),
                })
            });

        let pdf = renderer(backend).render(&request("<p>payload</p>")).await.unwrap();
        assert_eq!(pdf, b"%PDF");
    }

    #[tokio::test]
    async fn test_empty_html_rejected_before_backend() {
        let mut backend = MockRenderBackend::new();
        backend.expect_run().times(0);

        let renderer = renderer(backend);
        for html in ["", "   \n\t "] {
            let err = renderer.render(&request(html)).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_tool_failure_is_pdf_generation() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_mock = seen.clone();
        let mut backend = MockRenderBackend::new();
        backend.expect_run().returning(move |inv| {
            *seen_in_mock.lock().unwrap() = Some(inv.working_dir.clone());
            Ok(BackendOutput {
                success: false,
                exit_code: Some(1),
                output: "Exit with code 1 due to network error: HostNotFoundError".into(),
            })
        });

        let err = renderer(backend).render(&request("<p>x</p>")).await.unwrap_err();
        assert!(matches!(err, ServiceError::PdfGeneration(ref m) if m.contains("HostNotFoundError")));
        assert!(!seen.lock().unwrap().clone().unwrap().exists());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_pdf_generation() {
        let mut backend = MockRenderBackend::new();
        backend
            .expect_run()
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory")));

        let err = renderer(backend).render(&request("<p>x</p>")).await.unwrap_err();
        assert!(matches!(err, ServiceError::PdfGeneration(_)));
    }

    #[tokio::test]
    async fn test_empty_output_is_pdf_generation() {
        let seen = Arc::new(Mutex::new(None));
        let renderer = renderer(writing_backend(b"", seen.clone()));

        let err = renderer.render(&request("<p>x</p>")).await.unwrap_err();
        assert!(matches!(err, ServiceError::PdfGeneration(ref m) if m == "generated PDF is empty"));
        assert!(!seen.lock().unwrap().clone().unwrap().exists());
    }

    #[tokio::test]
    async fn test_missing_output_is_internal() {
        let mut backend = MockRenderBackend::new();
        backend.expect_run().returning(|_| {
            Ok(BackendOutput {
                success: true,
                exit_code: Some(0),
                output: String::new(),
            })
        });

        let err = renderer(backend).render(&request("<p>x</p>")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    struct HangingBackend {
        seen: Arc<Mutex<Option<PathBuf>>>,
    }

    #[async_trait]
    impl RenderBackend for HangingBackend {
        async fn run(&self, invocation: &Invocation) -> io::Result<BackendOutput> {
            *self.seen.lock().unwrap() = Some(invocation.working_dir.clone());
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(BackendOutput {
                success: false,
                exit_code: Some(1),
                output: "should never be observed".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_hanging_tool_is_timeout() {
        let seen = Arc::new(Mutex::new(None));
        let renderer = renderer(HangingBackend { seen: seen.clone() });

        let err = renderer.render(&request("<p>x</p>")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout), "got {err}");
        assert!(!seen.lock().unwrap().clone().unwrap().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_backend_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation {
            program: PathBuf::from("/bin/sh"),
            args: strings(&["-c", "printf '%%PDF-1.4' > output.pdf; echo out; echo err >&2"]),
            working_dir: dir.path().to_path_buf(),
            base_url: None,
        };

        let output = WkhtmltopdfBackend.run(&invocation).await.unwrap();
        assert!(output.success);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.output, "out\nerr\n");
        assert_eq!(std::fs::read(dir.path().join("output.pdf")).unwrap(), b"%PDF-1.4");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_backend_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation {
            program: PathBuf::from("/bin/sh"),
            args: strings(&["-c", "echo broken >&2; exit 3"]),
            working_dir: dir.path().to_path_buf(),
            base_url: None,
        };

        let output = WkhtmltopdfBackend.run(&invocation).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.output, "broken\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_backend_deadline_drops_child() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation {
            program: PathBuf::from("/bin/sh"),
            args: strings(&["-c", "sleep 5"]),
            working_dir: dir.path().to_path_buf(),
            base_url: None,
        };

        let started = std::time::Instant::now();
        let result =
            tokio::time::timeout(Duration::from_millis(100), WkhtmltopdfBackend.run(&invocation)).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    #[ignore]
    async fn test_real_wkhtmltopdf() {
        // Requires wkhtmltopdf on PATH
        let renderer = Renderer::new(RendererConfig::default(), Arc::new(WkhtmltopdfBackend));
        let pdf = renderer
            .render(&request("<html><body><h1>Hello</h1></body></html>"))
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }
}
