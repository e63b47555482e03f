use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use crate::{
    asset_pipeline::{AssetPipeline, Stage},
    common::{modified_system_time, with_suffix},
    AssetEvent, AssetKind, ChangeKind, Error, Result,
};
use flipm_shared::{
    crossbeam_channel::{self, Receiver, Sender},
    log::{error, info, trace, warn},
    parking_lot::Mutex,
    pathdiff,
    walkdir::WalkDir,
};
use notify_debouncer_full::{
    notify::{
        self,
        event::{ModifyKind, RenameMode},
        EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    },
    DebounceEventResult, Debouncer, FileIdMap,
};

/// Notifications about the work of the [`AssetWatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// All stages of the pipeline succeeded.
    Processed(PathBuf),
    /// The pipeline stopped at the given stage.
    Failed(PathBuf, Stage),
    /// The file has no pipeline.
    Ignored(PathBuf),
    /// A source file was removed. Its derived files are kept.
    Removed(PathBuf),
}

/// What happens with a file system event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Process(AssetKind),
    Removed(AssetKind),
    Ignore,
}

/// Decides by extension and change what happens with the event.
///
/// # Example
///
/// ```rust
/// use flipm_content::{asset_watcher::{classify, Dispatch}, AssetEvent, AssetKind, ChangeKind};
/// let event = AssetEvent::new("res/fonts/arial.TTF", ChangeKind::Changed);
/// assert_eq!(classify(&event), Dispatch::Process(AssetKind::Ttf));
/// ```
pub fn classify(event: &AssetEvent) -> Dispatch {
    match (event.change, event.kind()) {
        (ChangeKind::Created | ChangeKind::Changed, Some(kind)) => Dispatch::Process(kind),
        (ChangeKind::Removed, Some(kind)) => Dispatch::Removed(kind),
        (_, None) => Dispatch::Ignore,
    }
}

/// Translates a watcher event into the changes of the files it affects.
pub fn asset_events(event: &notify::Event) -> Vec<AssetEvent> {
    let change = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut events = Vec::new();
            if let [from, to, ..] = event.paths.as_slice() {
                events.push(AssetEvent::new(from, ChangeKind::Removed));
                events.push(AssetEvent::new(to, ChangeKind::Created));
            }
            return events;
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Changed,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Any | EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };
    event.paths.iter().map(|path| AssetEvent::new(path, change)).collect()
}

enum Item {
    Wakeup,
    Process(ProcessItem),
}

struct ProcessItem {
    kind: AssetKind,
    path: PathBuf,
}

type Observers = Arc<Mutex<Vec<Sender<Event>>>>;

/// Watches the resource directory and runs the [`AssetPipeline`] for every source file
/// that is created or changed.
///
/// Every event starts its pipeline on a thread of its own, so a hanging encoder only
/// holds up the file it was started for. Events for the same file are not serialized:
/// when a file changes while its pipeline is still running, a second pipeline for the
/// same file starts and both write the same derived files.
pub struct AssetWatcher {
    pipeline: Arc<AssetPipeline>,
    wants_drop: Arc<AtomicBool>,
    item_sender: Sender<Item>,
    observers: Observers,
    _watcher: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl AssetWatcher {
    /// Starts the dispatch thread and watching the resource directory of the pipeline's settings.
    pub fn new(pipeline: AssetPipeline) -> Result<Self> {
        let pipeline = Arc::new(pipeline);
        let settings = pipeline.settings().clone();
        info!("Creating AssetWatcher for '{}'", settings.resource_dir().display());

        let observers: Observers = Arc::new(Mutex::new(Vec::new()));
        let wants_drop = Arc::new(AtomicBool::new(false));

        let (item_sender, item_receiver) = crossbeam_channel::unbounded::<Item>();
        spawn_dispatch_thread(&wants_drop, item_receiver, &pipeline, &observers)?;

        let sender2 = item_sender.clone();
        let observers2 = observers.clone();
        let resource_dir = settings.resource_dir().to_owned();
        let watch_fn = move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    for asset_event in asset_events(&event) {
                        trace! {
                            "Watcher reported '{:?}' for '{}'",
                            event.kind,
                            relative_path(&asset_event.path, &resource_dir).display()
                        };
                        dispatch(&asset_event, &sender2, &observers2);
                    }
                }
            }
            Err(errors) => {
                let errs = errors.into_iter().map(|err| err.to_string()).collect::<Vec<_>>().join(", ");
                error!("Failed to receive events from file watcher: {errs}");
            }
        };

        let mut watcher = notify_debouncer_full::new_debouncer(settings.debounce, None, watch_fn)
            .map_err(|_| Error::FailedToStartDirectoryWatcher(settings.resource_dir().to_owned()))?;
        watcher
            .watcher()
            .watch(settings.resource_dir(), RecursiveMode::Recursive)
            .map_err(|_| Error::FailedToStartDirectoryWatcher(settings.resource_dir().to_owned()))?;

        let asset_watcher = Self {
            pipeline,
            wants_drop,
            item_sender,
            observers,
            _watcher: watcher,
        };
        if settings.scan_on_start {
            asset_watcher.scan()?;
        }
        Ok(asset_watcher)
    }

    /// Queues every source file whose `.gpb` file is missing or older than the source.
    pub fn scan(&self) -> Result<usize> {
        let resource_dir = self.pipeline.settings().resource_dir();
        info!("Scanning '{}' for outdated assets", resource_dir.display());

        let mut count = 0;
        for entry in WalkDir::new(resource_dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Failed to read directory entry while scanning: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let event = AssetEvent::new(entry.path(), ChangeKind::Changed);
            let Some(kind) = event.kind() else {
                continue;
            };
            if !is_outdated(&event) {
                trace!("Asset is up to date: {}", relative_path(&event.path, resource_dir).display());
                continue;
            }
            info!("Asset is outdated: {}", relative_path(&event.path, resource_dir).display());
            enqueue(kind, &event.path, &self.item_sender);
            count += 1;
        }
        Ok(count)
    }

    /// Returns a channel that can be used to observe [`Event`]s.
    pub fn observe(&mut self) -> Receiver<Event> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.observers.lock().push(sender);
        receiver
    }
}

impl Drop for AssetWatcher {
    fn drop(&mut self) {
        self.wants_drop.store(true, Ordering::SeqCst);
        if let Err(err) = self.item_sender.send(Item::Wakeup) {
            error!("Failed to send wakeup item to AssetWatcher thread in drop implementation: {err}");
        }
    }
}

/// The `.gpb` file of a source is outdated when it's missing or older than the source.
fn is_outdated(event: &AssetEvent) -> bool {
    let gpb = with_suffix(&event.base_path(), ".gpb");
    match (modified_system_time(&event.path), modified_system_time(&gpb)) {
        (Some(source_modified), Some(gpb_modified)) => gpb_modified < source_modified,
        _ => true,
    }
}

fn relative_path(path: &Path, resource_dir: &Path) -> PathBuf {
    pathdiff::diff_paths(path, resource_dir).unwrap_or_else(|| path.to_owned())
}

fn dispatch(event: &AssetEvent, sender: &Sender<Item>, observers: &Observers) {
    match classify(event) {
        Dispatch::Process(kind) => {
            info!("New or changed {kind} asset: {}", event.base_path().display());
            enqueue(kind, &event.path, sender);
        }
        Dispatch::Removed(kind) => {
            // Derived files (.gpb, .material, .scene, ...) are left in place.
            info!("Removed {kind} asset: {}", event.base_path().display());
            notify_observers(observers, Event::Removed(event.path.clone()));
        }
        Dispatch::Ignore => {
            info!("Ignoring {}: {}", event.change, event.path.display());
            notify_observers(observers, Event::Ignored(event.path.clone()));
        }
    }
}

fn enqueue(kind: AssetKind, path: &Path, sender: &Sender<Item>) {
    let item = Item::Process(ProcessItem {
        kind,
        path: path.to_owned(),
    });
    if let Err(err) = sender.send(item) {
        error!("Failed to send item to AssetWatcher thread: {err}");
    }
}

/// Sends the event to all observers and removes the channels that are no longer active.
fn notify_observers(observers: &Observers, event: Event) {
    let mut observers = observers.lock();
    observers.retain(|sender| match sender.send(event.clone()) {
        Ok(()) => true,
        Err(err) => {
            warn!("Failed to send event {:?}: \"{err}\". Channel will be removed.", event);
            false
        }
    });
}

/// Starts the thread that hands every queued asset to a pipeline thread of its own.
fn spawn_dispatch_thread(
    wants_drop: &Arc<AtomicBool>,
    item_receiver: Receiver<Item>,
    pipeline: &Arc<AssetPipeline>,
    observers: &Observers,
) -> Result<()> {
    let wants_drop = wants_drop.clone();
    let pipeline = pipeline.clone();
    let observers = observers.clone();
    thread::Builder::new()
        .name("AssetWatcher dispatch".to_owned())
        .spawn(move || {
            info!("Starting AssetWatcher dispatch thread");
            let mut pipeline_index = 0usize;
            loop {
                trace!("Waiting for item on AssetWatcher dispatch thread");
                let Ok(item) = item_receiver.recv() else {
                    error!("AssetWatcher dispatch thread failed to receive item");
                    break;
                };
                if wants_drop.load(Ordering::SeqCst) {
                    trace!("AssetWatcher wants to be dropped");
                    break;
                }

                let process_item = match item {
                    Item::Wakeup => continue,
                    Item::Process(process_item) => process_item,
                };

                if !process_item.path.exists() {
                    info!("Asset '{}' was deleted before it could be processed", process_item.path.display());
                    continue;
                }

                let path = process_item.path.clone();
                if let Err(err) = spawn_pipeline_thread(&pipeline, &observers, process_item, pipeline_index) {
                    error!("Failed to start pipeline for '{}': {err}", path.display());
                }
                pipeline_index = pipeline_index.wrapping_add(1);
            }
            info!("AssetWatcher dispatch thread will stop now");
        })
        .map_err(|_| Error::FailedToStartThread)?;
    Ok(())
}

/// Runs the pipeline of one asset on a new thread. A pipeline that waits for a hanging
/// encoder only blocks its own thread.
fn spawn_pipeline_thread(
    pipeline: &Arc<AssetPipeline>,
    observers: &Observers,
    process_item: ProcessItem,
    pipeline_index: usize,
) -> std::io::Result<()> {
    let pipeline = pipeline.clone();
    let observers = observers.clone();
    let thread_name = format!("AssetWatcher pipeline {pipeline_index}");
    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        info!("{thread_name} starting work on {}", process_item.path.display());
        let event = match pipeline.run(process_item.kind, &process_item.path) {
            Ok(()) => {
                info!("Successfully processed {}", process_item.path.display());
                Event::Processed(process_item.path)
            }
            Err(err) => {
                error!("{err}");
                Event::Failed(process_item.path, err.stage)
            }
        };
        notify_observers(&observers, event);
    })?;
    Ok(())
}
