//! Building, opening and running stories on disk.
//!
//! A [`Workspace`] owns two storage roots: derived data (build products) and
//! a temp root that archives are extracted into. Nothing here is global;
//! every service is handed the roots it works in.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{DiagnosticSet, Severity};
use crate::processor::{Phase, Player, StoryIR, build_ir};
use crate::project::{self, Project};
use crate::writer::archive::{self, ArchiveError};
use crate::writer::bin::{self, DecodeError};
use crate::writer::text;

pub const STORY_EXTENSION: &str = "zir";
pub const ARCHIVE_EXTENSION: &str = "sar";
const BUILD_DIR: &str = "Build";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    derived_root: PathBuf,
    temp_root: PathBuf,
}

/// Outcome of one build: every diagnostic, and the product when it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub project: String,
    pub diagnostics: DiagnosticSet,
    pub output: Option<PathBuf>,
}

impl BuildReport {
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }

    pub fn errors(&self) -> usize {
        self.diagnostics.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.diagnostics.count(Severity::Warning)
    }
}

impl Workspace {
    pub fn new(derived_root: impl Into<PathBuf>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            derived_root: derived_root.into(),
            temp_root: temp_root.into(),
        }
    }

    pub fn derived_root(&self) -> &Path {
        &self.derived_root
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// `<derived>/<project>/Build/<project>.zir`
    pub fn build_output(&self, project: &Project) -> PathBuf {
        let key = project_key(project);
        self.derived_root
            .join(&key)
            .join(BUILD_DIR)
            .join(format!("{key}.{STORY_EXTENSION}"))
    }

    /// Compiles every phase of `project` and writes the story on success.
    ///
    /// A failed build is still `Ok`; its diagnostics say why.
    pub fn build(&self, project: &Project) -> anyhow::Result<BuildReport> {
        let (report, ir) = self.compile(project)?;
        let Some(ir) = ir else {
            return Ok(report);
        };
        let output = self.build_output(project);
        if let Some(dir) = output.parent() {
            fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))?;
        }
        bin::emit(&ir, &output).with_context(|| format!("Writing {}", output.display()))?;
        info!(project = %report.project, output = %output.display(), "build succeeded");
        Ok(BuildReport {
            output: Some(output),
            ..report
        })
    }

    /// Builds `project` and packs the story with its assets into `dest`.
    pub fn pack(&self, project: &Project, dest: &Path) -> anyhow::Result<BuildReport> {
        let (report, ir) = self.compile(project)?;
        let Some(ir) = ir else {
            return Ok(report);
        };
        let asset_dir = project.asset_dir();
        let bytes = archive::pack(&bin::encode(&ir), asset_dir.as_deref())
            .with_context(|| format!("Packing {}", project.root().display()))?;
        fs::write(dest, bytes).with_context(|| format!("Writing {}", dest.display()))?;
        info!(project = %report.project, output = %dest.display(), "packed story archive");
        Ok(BuildReport {
            output: Some(dest.to_path_buf()),
            ..report
        })
    }

    fn compile(&self, project: &Project) -> anyhow::Result<(BuildReport, Option<StoryIR>)> {
        let sources = project
            .read_phases()
            .with_context(|| format!("Reading phases of {}", project.root().display()))?;
        let phases: Vec<Phase> = sources
            .iter()
            .map(|(name, source)| Phase::new(name, source))
            .collect();

        let mut diagnostics = DiagnosticSet::new();
        let ir = build_ir(&phases, &project.build_options(), &mut diagnostics);
        let report = BuildReport {
            project: project_key(project),
            diagnostics,
            output: None,
        };
        if ir.is_none() {
            info!(
                project = %report.project,
                errors = report.errors(),
                "build failed"
            );
        }
        Ok((report, ir))
    }

    /// Opens a `.zir` story directly or extracts a `.sar` archive first.
    ///
    /// Archives go into a fresh `<temp>/<uuid>/` directory that lives as long
    /// as the returned story (or the run it is handed to).
    pub fn open_story(&self, path: &Path) -> Result<OpenedStory, OpenError> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let bytes = || {
            fs::read(path).map_err(|source| OpenError::Read {
                path: path.to_path_buf(),
                source,
            })
        };
        match extension {
            STORY_EXTENSION => {
                let ir = bin::decode(&bytes()?)?;
                debug!(path = %path.display(), "opened story");
                Ok(OpenedStory {
                    ir: Arc::new(ir),
                    asset_root: None,
                    session: None,
                })
            }
            ARCHIVE_EXTENSION => {
                let bytes = bytes()?;
                let session = Session::new(&self.temp_root);
                archive::extract(&bytes, &session.dir)?;
                let story = session.dir.join(archive::STORY_ENTRY);
                let story_bytes = fs::read(&story).map_err(|source| OpenError::Read {
                    path: story.clone(),
                    source,
                })?;
                let ir = bin::decode(&story_bytes)?;
                let assets = session.dir.join(archive::ASSETS_DIR);
                info!(path = %path.display(), session = %session.id, "opened story archive");
                Ok(OpenedStory {
                    ir: Arc::new(ir),
                    asset_root: assets.is_dir().then_some(assets),
                    session: Some(session),
                })
            }
            _ => Err(OpenError::UnsupportedExtension(path.to_path_buf())),
        }
    }
}

fn project_key(project: &Project) -> String {
    project
        .root()
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map_or_else(|| project.name().to_string(), str::to_string)
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("cannot open {0}: expected a .zir story or a .sar archive")]
    UnsupportedExtension(PathBuf),
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt story: {0}")]
    Decode(#[from] DecodeError),
    #[error("corrupt story archive: {0}")]
    Archive(#[from] ArchiveError),
}

/// Extraction directory of one archive; removed on drop.
#[derive(Debug)]
struct Session {
    id: Uuid,
    dir: PathBuf,
}

impl Session {
    fn new(temp_root: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            dir: temp_root.join(id.to_string()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(session = %self.id, "removed extraction directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(session = %self.id, error = %e, "could not remove extraction directory"),
        }
    }
}

#[derive(Debug)]
pub struct OpenedStory {
    pub ir: Arc<StoryIR>,
    pub asset_root: Option<PathBuf>,
    session: Option<Session>,
}

impl OpenedStory {
    /// Where an archive was extracted to, if this story came from one.
    pub fn extraction_dir(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.dir.as_path())
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }

    pub fn player(&self) -> Player {
        Player::new(Arc::clone(&self.ir), self.asset_root.clone())
    }
}

struct ActiveRun {
    player: Player,
    // Held for its Drop.
    _session: Option<Session>,
}

/// At most one running story per project.
#[derive(Default)]
pub struct RunRegistry {
    runs: HashMap<String, ActiveRun>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `story` for `project`, tearing down the run it replaces.
    pub fn start(&mut self, project: &str, story: OpenedStory) -> &mut Player {
        if self.stop(project) {
            debug!(project, "replaced running story");
        }
        let player = story.player();
        let run = ActiveRun {
            player,
            _session: story.session,
        };
        &mut self.runs.entry(project.to_string()).or_insert(run).player
    }

    /// Drops the run of `project`. Returns whether there was one.
    pub fn stop(&mut self, project: &str) -> bool {
        self.runs.remove(project).is_some()
    }

    pub fn is_running(&self, project: &str) -> bool {
        self.runs.contains_key(project)
    }

    pub fn player_mut(&mut self, project: &str) -> Option<&mut Player> {
        self.runs.get_mut(project).map(|run| &mut run.player)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Writes the plain text and Sirius dumps of `ir` into `dir`.
pub fn export_debug(ir: &StoryIR, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))?;
    // The name comes from the image, so it may not point outside `dir`.
    let name = match ir.metadata.project_name.as_str() {
        name if project::validate_file_name(name).is_ok() => name,
        name => {
            warn!(name, "story name is not a file name; using Story");
            "Story"
        }
    };
    let outputs = [
        (dir.join(format!("{name}.txt")), text::plain_text(ir)),
        (dir.join(format!("{name}.sirius.json")), text::sirius(ir)),
    ];
    let mut written = Vec::with_capacity(outputs.len());
    for (path, contents) in outputs {
        fs::write(&path, contents).with_context(|| format!("Writing {}", path.display()))?;
        written.push(path);
    }
    info!(dir = %dir.display(), "exported debug dumps");
    Ok(written)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    Queued,
    Building,
}

/// One entry of the build queue's progress list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Work {
    pub id: u64,
    pub project: String,
    pub status: WorkStatus,
}

struct Job {
    id: u64,
    project: Project,
    reply: mpsc::Sender<anyhow::Result<BuildReport>>,
}

/// Runs builds one after another on a dedicated thread.
pub struct BuildQueue {
    current_works: Arc<Mutex<Vec<Work>>>,
    jobs: Option<mpsc::Sender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
    next_id: u64,
}

/// Pending result of a queued build.
pub struct BuildTicket {
    pub id: u64,
    reply: mpsc::Receiver<anyhow::Result<BuildReport>>,
}

impl BuildTicket {
    /// Blocks until the build is done.
    pub fn wait(self) -> anyhow::Result<BuildReport> {
        self.reply
            .recv()
            .unwrap_or_else(|_| Err(anyhow::anyhow!("build queue stopped before build {}", self.id)))
    }
}

fn lock(works: &Mutex<Vec<Work>>) -> std::sync::MutexGuard<'_, Vec<Work>> {
    works.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BuildQueue {
    pub fn new(workspace: Workspace) -> Self {
        let current_works = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel::<Job>();
        let works = Arc::clone(&current_works);
        let handle = thread::spawn(move || {
            for job in rx {
                set_status(&works, job.id, WorkStatus::Building);
                debug!(id = job.id, project = %job.project.name(), "build started");
                let result = workspace.build(&job.project);
                lock(&works).retain(|w| w.id != job.id);
                let _ = job.reply.send(result);
            }
        });
        Self {
            current_works,
            jobs: Some(tx),
            handle: Some(handle),
            next_id: 0,
        }
    }

    pub fn submit(&mut self, project: Project) -> BuildTicket {
        self.next_id += 1;
        let id = self.next_id;
        let (reply, rx) = mpsc::channel();
        lock(&self.current_works).push(Work {
            id,
            project: project_key(&project),
            status: WorkStatus::Queued,
        });
        let job = Job { id, project, reply };
        if let Some(jobs) = &self.jobs
            && let Err(mpsc::SendError(job)) = jobs.send(job)
        {
            lock(&self.current_works).retain(|w| w.id != job.id);
        }
        BuildTicket { id, reply: rx }
    }

    /// Snapshot of the builds that are queued or running.
    pub fn current_works(&self) -> Vec<Work> {
        lock(&self.current_works).clone()
    }

    /// Shared handle to the progress list.
    pub fn works_handle(&self) -> Arc<Mutex<Vec<Work>>> {
        Arc::clone(&self.current_works)
    }
}

fn set_status(works: &Mutex<Vec<Work>>, id: u64, status: WorkStatus) {
    if let Some(work) = lock(works).iter_mut().find(|w| w.id == id) {
        work.status = status;
    }
}

impl Drop for BuildQueue {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("build thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Locale;
    use crate::processor::{PlayerEvent, PlayerState};

    fn setup() -> (tempfile::TempDir, Workspace, Project) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("Derived"), dir.path().join("Temp"));
        let project = Project::create(dir.path(), "Demo", Locale::Jp).unwrap();
        (dir, workspace, project)
    }

    #[test]
    fn test_build_writes_story() {
        let (_dir, workspace, project) = setup();
        let report = workspace.build(&project).unwrap();
        assert!(report.succeeded());
        let output = report.output.unwrap();
        assert!(output.ends_with("Demo/Build/Demo.zir"));

        let story = workspace.open_story(&output).unwrap();
        assert!(story.extraction_dir().is_none());
        let mut player = story.player();
        assert_eq!(
            player.advance().unwrap(),
            PlayerEvent::Narration {
                text: "Once upon a time...".into()
            }
        );
    }

    #[test]
    fn test_failed_build_has_no_output() {
        let (_dir, workspace, mut project) = setup();
        project.add_phase("Broken.zeile", "let x = 1\nlet y = x +\n").unwrap();
        let report = workspace.build(&project).unwrap();
        assert!(!report.succeeded());
        assert!(report.errors() >= 1);
        assert!(
            report
                .diagnostics
                .for_file("Broken.zeile")
                .iter()
                .any(|d| d.severity == Severity::Error && d.line == 2)
        );
        assert!(!workspace.build_output(&project).exists());
    }

    #[test]
    fn test_open_rejects_other_extensions() {
        let (dir, workspace, _project) = setup();
        let path = dir.path().join("story.txt");
        fs::write(&path, "hello").unwrap();
        assert!(matches!(
            workspace.open_story(&path),
            Err(OpenError::UnsupportedExtension(_))
        ));

        let corrupt = dir.path().join("story.zir");
        fs::write(&corrupt, "ZEIR").unwrap();
        assert!(matches!(
            workspace.open_story(&corrupt),
            Err(OpenError::Decode(_))
        ));
    }

    #[test]
    fn test_archive_sessions_are_isolated_and_cleaned_up() {
        let (dir, workspace, project) = setup();
        let sar = dir.path().join("Demo.sar");
        assert!(workspace.pack(&project, &sar).unwrap().succeeded());

        let first = workspace.open_story(&sar).unwrap();
        let second = workspace.open_story(&sar).unwrap();
        let first_dir = first.extraction_dir().unwrap().to_path_buf();
        let second_dir = second.extraction_dir().unwrap().to_path_buf();
        assert_ne!(first_dir, second_dir);
        assert!(first_dir.starts_with(workspace.temp_root()));
        assert_eq!(first.asset_root, Some(first_dir.join("Assets")));

        let mut runs = RunRegistry::new();
        runs.start("Demo", first);
        assert!(first_dir.exists());

        runs.start("Demo", second);
        assert_eq!(runs.len(), 1);
        assert!(!first_dir.exists());
        assert!(second_dir.exists());

        let player = runs.player_mut("Demo").unwrap();
        assert_eq!(player.state(), &PlayerState::NotStarted);
        player.advance().unwrap();

        assert!(runs.stop("Demo"));
        assert!(!runs.stop("Demo"));
        assert!(!second_dir.exists());
    }

    #[test]
    fn test_export_debug() {
        let (dir, workspace, project) = setup();
        let output = workspace.build(&project).unwrap().output.unwrap();
        let ir = bin::load(&output).unwrap();
        let written = export_debug(&ir, &dir.path().join("Debug")).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("Demo.txt"));
        assert!(written[1].ends_with("Demo.sirius.json"));
        assert!(fs::read_to_string(&written[0]).unwrap().contains("narrate"));
    }

    #[test]
    fn test_export_debug_stays_in_dir() {
        let (dir, workspace, project) = setup();
        let output = workspace.build(&project).unwrap().output.unwrap();
        let mut ir = bin::load(&output).unwrap();
        let out = dir.path().join("Debug");
        for name in ["../escaped", "a/b", "..", ""] {
            ir.metadata.project_name = name.to_string();
            let written = export_debug(&ir, &out).unwrap();
            assert_eq!(written[0], out.join("Story.txt"), "{name}");
            assert_eq!(written[1], out.join("Story.sirius.json"), "{name}");
        }
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_build_queue() {
        let (_dir, workspace, project) = setup();
        let mut queue = BuildQueue::new(workspace);
        let first = queue.submit(project.clone());
        let second = queue.submit(project);
        assert!(second.id > first.id);
        assert!(first.wait().unwrap().succeeded());
        assert!(second.wait().unwrap().succeeded());
        assert!(queue.current_works().is_empty());
    }
}
