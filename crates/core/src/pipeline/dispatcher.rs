//! Request dispatcher: drives one user request end to end.
//!
//! Downloading -> type checking -> optional input normalization -> duration
//! capping -> admission queue -> heavy step -> size fitting -> delivery.
//! A scratch session brackets the whole request; it is closed on every exit
//! path before the outcome leaves this module.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::types::{clamp_dimensions, Job, Produced, RequestOutcome, RequestSpec, WorkerProduced};
use crate::config::LimitsConfig;
use crate::converter::{Converter, MediaInfo, MediaKind};
use crate::error::ProcessingError;
use crate::executor;
use crate::metrics;
use crate::platform::{MediaHost, RequestPhase};
use crate::queue::AdmissionQueue;
use crate::scratch::{ScratchDir, ScratchSession, TempFile};
use crate::sizefit::{format_bytes, SizeFitter};

/// Orchestrates media requests against a converter and a chat host.
pub struct Dispatcher<C, H>
where
    C: Converter,
    H: MediaHost,
{
    limits: LimitsConfig,
    scratch: Arc<ScratchDir>,
    converter: Arc<C>,
    host: Arc<H>,
    queue: Arc<AdmissionQueue>,
    fitter: SizeFitter<C>,
}

impl<C, H> Dispatcher<C, H>
where
    C: Converter,
    H: MediaHost,
{
    /// Creates a new dispatcher.
    pub fn new(
        limits: LimitsConfig,
        scratch: Arc<ScratchDir>,
        converter: Arc<C>,
        host: Arc<H>,
        queue: Arc<AdmissionQueue>,
    ) -> Self {
        let fitter = SizeFitter::new(Arc::clone(&converter), limits.clone());
        Self {
            limits,
            scratch,
            converter,
            host,
            queue,
            fitter,
        }
    }

    /// Runs one request to completion.
    ///
    /// User-facing failures are caught here and turned into
    /// [`RequestOutcome::Rejected`]; command failures and empty results are
    /// logged with full context, surfaced to the host with diagnostics, and
    /// re-raised. The scratch session closes before any of that happens.
    pub async fn dispatch(
        &self,
        spec: RequestSpec,
        job: Job,
    ) -> Result<RequestOutcome, ProcessingError> {
        let started = Instant::now();
        let session = ScratchSession::open(Arc::clone(&self.scratch));

        let result = session.enter(self.run_request(&session, spec, job)).await;

        // cleanup is ordered strictly after the request's own work and runs
        // on every path out of here
        session.close().await;

        let outcome = match result {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_user_facing() => {
                let message = e.to_string();
                info!("request rejected: {message}");
                self.host.notify(&message).await;
                Ok(RequestOutcome::Rejected { message })
            }
            Err(e) => {
                error!("request failed: {e}");
                let mut message =
                    String::from("Something went wrong while processing your request.");
                if let Some(output) = e.command_output() {
                    message.push_str("\nDiagnostic output:\n");
                    message.push_str(output);
                }
                self.host.notify(&message).await;
                Err(e)
            }
        };

        let label = match &outcome {
            Ok(o) => o.as_str(),
            Err(_) => "error",
        };
        metrics::REQUESTS_TOTAL.with_label_values(&[label]).inc();
        metrics::REQUEST_DURATION.observe(started.elapsed().as_secs_f64());
        outcome
    }

    async fn run_request(
        &self,
        session: &ScratchSession,
        spec: RequestSpec,
        job: Job,
    ) -> Result<RequestOutcome, ProcessingError> {
        let mut inputs: Vec<TempFile> = Vec::new();

        if !spec.input_kinds.is_empty() {
            let wanted = spec.input_kinds.len();

            self.host.update_status(RequestPhase::Downloading).await;
            let sources = self.host.locate_media(wanted).await?;
            if sources.len() < wanted {
                info!("no media found ({} of {wanted} inputs)", sources.len());
                return Ok(RequestOutcome::NoMediaFound);
            }
            for url in sources.iter().take(wanted) {
                inputs.push(self.download(session, url).await?);
            }

            self.host.update_status(RequestPhase::TypeChecking).await;
            let mut infos: Vec<MediaInfo> = Vec::with_capacity(inputs.len());
            for (i, file) in inputs.iter().enumerate() {
                let info = self.converter.probe(file.path()).await?;
                let allowed = &spec.input_kinds[i];
                if !allowed.contains(&info.kind) {
                    let message = format!(
                        "media #{} is {}, it must be: {}",
                        i + 1,
                        info.kind,
                        allowed
                            .iter()
                            .map(MediaKind::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    warn!("{message}");
                    return Ok(RequestOutcome::Rejected { message });
                }
                infos.push(info);
            }

            if spec.normalize_resolution {
                self.host.update_status(RequestPhase::Resizing).await;
                for i in 0..inputs.len() {
                    if !infos[i].kind.is_visual() {
                        continue;
                    }
                    let Some((width, height)) = infos[i].dimensions() else {
                        continue;
                    };
                    if let Some((new_width, new_height)) = clamp_dimensions(
                        width,
                        height,
                        self.limits.min_dimension,
                        self.limits.max_dimension,
                    ) {
                        info!(
                            "normalizing input #{} from {width}x{height} to {new_width}x{new_height}",
                            i + 1
                        );
                        inputs[i] = self
                            .converter
                            .resize(inputs[i].path(), new_width, new_height)
                            .await?;
                        infos[i] = self.converter.probe(inputs[i].path()).await?;
                    }
                }
            }

            if spec.privileged {
                debug!("privileged caller is exempt from duration capping");
            } else {
                self.host.update_status(RequestPhase::DurationCapping).await;
                for i in 0..inputs.len() {
                    if infos[i].kind != MediaKind::Video {
                        continue;
                    }
                    inputs[i] = self.cap_duration(inputs[i].clone(), &infos[i]).await?;
                }
            }
        }

        self.host.update_status(RequestPhase::Queued).await;
        let produced: Option<Produced> = match job {
            Job::Scheduler(f) => {
                let host = Arc::clone(&self.host);
                let files = inputs.clone();
                self.queue
                    .enqueue(async move {
                        host.update_status(RequestPhase::Executing).await;
                        f(files).await
                    })
                    .await?
            }
            Job::Isolated(f) => {
                let host = Arc::clone(&self.host);
                let paths: Vec<PathBuf> =
                    inputs.iter().map(|t| t.path().to_path_buf()).collect();
                let produced = self
                    .queue
                    .enqueue(async move {
                        host.update_status(RequestPhase::Executing).await;
                        executor::run_isolated(session, move |scope| f(scope, paths)).await
                    })
                    .await?;
                produced.map(|wp| match wp {
                    WorkerProduced::Artifact(path) => Produced::Artifact(session.claim(&path)),
                    WorkerProduced::Message(message) => Produced::Message(message),
                })
            }
        };

        if spec.expects_artifact {
            let artifact = match produced {
                Some(Produced::Artifact(artifact)) => artifact,
                Some(Produced::Message(_)) => {
                    return Err(ProcessingError::internal(
                        "job produced a message where an artifact was expected",
                    ))
                }
                None => {
                    return Err(ProcessingError::EmptyResult(
                        "expected an artifact and the step produced none".to_string(),
                    ))
                }
            };

            self.host.update_status(RequestPhase::FittingOutput).await;
            let fitted = self.fitter.fit(artifact).await?;
            let size_bytes = tokio::fs::metadata(fitted.path()).await?.len();

            info!("uploading {} result", format_bytes(size_bytes));
            self.host.update_status(RequestPhase::Uploading).await;
            self.host
                .deliver(fitted.path(), spec.upload_filename.as_deref())
                .await?;

            Ok(RequestOutcome::Delivered {
                path: fitted.path().to_path_buf(),
                size_bytes,
            })
        } else {
            match produced {
                Some(Produced::Message(message)) => {
                    self.host.notify(&message).await;
                    Ok(RequestOutcome::Text(message))
                }
                Some(Produced::Artifact(_)) => Err(ProcessingError::internal(
                    "job produced an artifact where a message was expected",
                )),
                None => Err(ProcessingError::EmptyResult(
                    "expected a message and the step produced none".to_string(),
                )),
            }
        }
    }

    /// Fetches one source into a session-reserved scratch file, enforcing
    /// the download size cap.
    async fn download(
        &self,
        session: &ScratchSession,
        url: &str,
    ) -> Result<TempFile, ProcessingError> {
        let bytes = self.host.fetch(url).await?;
        if bytes.len() as u64 > self.limits.max_download_bytes {
            return Err(ProcessingError::user_facing(format!(
                "file at {url} is {} which is over the {} download limit",
                format_bytes(bytes.len() as u64),
                format_bytes(self.limits.max_download_bytes)
            )));
        }
        let file = session.reserve(&extension_for_url(url));
        tokio::fs::write(file.path(), &bytes).await?;
        debug!("saved {} to {}", url, file.path().display());
        Ok(file)
    }

    /// Caps a video's frame rate, then trims it when the frame count still
    /// exceeds the configured maximum.
    async fn cap_duration(
        &self,
        file: TempFile,
        info: &MediaInfo,
    ) -> Result<TempFile, ProcessingError> {
        let Some(mut fps) = info.fps else {
            return Ok(file);
        };
        let mut file = file;

        if fps > self.limits.max_fps {
            debug!("capping fps from {fps} to {}", self.limits.max_fps);
            file = self
                .converter
                .change_fps(file.path(), self.limits.max_fps)
                .await?;
            fps = self.limits.max_fps;
        }

        let duration = info.duration_secs.unwrap_or(0.0);
        let frames = (fps * duration) as u64;
        if frames > self.limits.max_frames {
            let new_duration = self.limits.max_frames as f64 / fps;
            self.host
                .notify(&format!(
                    "input is too long (~{frames} frames), trimming to {:.1}s (~{} frames)",
                    new_duration, self.limits.max_frames
                ))
                .await;
            file = self.converter.trim(file.path(), new_duration).await?;
        }

        Ok(file)
    }
}

/// Guesses a file extension from a source URL, falling back to "bin".
fn extension_for_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 4
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "bin".to_string(),
    }
}
