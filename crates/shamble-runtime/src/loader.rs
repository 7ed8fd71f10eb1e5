//! Background asset loading.
//!
//! Each request runs on its own thread and reports through a [`LoadSink`]:
//! progress while the file is read, then exactly one `Finished` event.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

use shamble_anim::AnimationClip;
use shamble_gltf::GltfError;
use shamble_scene::{CubeMap, Prefab};
use winit::event_loop::EventLoopProxy;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadId(pub(crate) u64);

impl std::fmt::Display for LoadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub enum LoadedAsset {
    Model(Prefab),
    Animations(Vec<AnimationClip>),
    Skybox(CubeMap),
}

impl LoadedAsset {
    pub fn kind(&self) -> &'static str {
        match self {
            LoadedAsset::Model(_) => "model",
            LoadedAsset::Animations(_) => "animations",
            LoadedAsset::Skybox(_) => "skybox",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Gltf {
        path: PathBuf,
        #[source]
        source: GltfError,
    },

    #[error("failed to decode {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cube face {} is {width}x{height}, expected {expected}x{expected}", path.display())]
    FaceSize {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("could not start loader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug)]
pub enum LoadEvent {
    Progress {
        id: LoadId,
        loaded: u64,
        total: u64,
    },
    Finished {
        id: LoadId,
        outcome: Result<LoadedAsset, LoadError>,
    },
}

/// Receiver of loader events.
pub trait LoadSink: Send + 'static {
    fn deliver(&self, event: LoadEvent);

    fn clone_box(&self) -> Box<dyn LoadSink>;
}

impl LoadSink for mpsc::Sender<LoadEvent> {
    fn deliver(&self, event: LoadEvent) {
        if self.send(event).is_err() {
            log::debug!("load event dropped, receiver is gone");
        }
    }

    fn clone_box(&self) -> Box<dyn LoadSink> {
        Box::new(self.clone())
    }
}

impl<T> LoadSink for EventLoopProxy<T>
where
    T: From<LoadEvent> + Send + 'static,
{
    fn deliver(&self, event: LoadEvent) {
        if self.send_event(T::from(event)).is_err() {
            log::debug!("load event dropped, event loop has exited");
        }
    }

    fn clone_box(&self) -> Box<dyn LoadSink> {
        Box::new(self.clone())
    }
}

pub struct AssetLoader {
    sink: Box<dyn LoadSink>,
    next_id: AtomicU64,
}

impl AssetLoader {
    pub fn new(sink: impl LoadSink) -> Self {
        Self {
            sink: Box::new(sink),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn load_model(&self, path: impl Into<PathBuf>) -> LoadId {
        let path = path.into();
        self.spawn("model", move |id, sink| {
            let bytes = read_with_progress(&path, id, sink, 0, None)?;
            let mut prefab =
                shamble_gltf::load_model_from_slice(&bytes, path.parent()).map_err(|source| {
                    LoadError::Gltf {
                        path: path.clone(),
                        source,
                    }
                })?;
            if prefab.name.is_none() {
                prefab.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            }
            Ok(LoadedAsset::Model(prefab))
        })
    }

    pub fn load_animations(&self, path: impl Into<PathBuf>) -> LoadId {
        let path = path.into();
        self.spawn("animations", move |id, sink| {
            let bytes = read_with_progress(&path, id, sink, 0, None)?;
            shamble_gltf::load_animations_from_slice(&bytes, path.parent())
                .map(LoadedAsset::Animations)
                .map_err(|source| LoadError::Gltf {
                    path: path.clone(),
                    source,
                })
        })
    }

    /// Loads six square faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn load_cube_map(&self, faces: [PathBuf; 6]) -> LoadId {
        self.spawn("skybox", move |id, sink| {
            let total = faces
                .iter()
                .filter_map(|p| std::fs::metadata(p).ok())
                .map(|m| m.len())
                .sum();

            let mut loaded = 0;
            let mut size = None;
            let mut decoded: [Vec<u8>; 6] = Default::default();
            for (slot, path) in decoded.iter_mut().zip(&faces) {
                let bytes = read_with_progress(path, id, sink, loaded, Some(total))?;
                loaded += bytes.len() as u64;

                let rgba = image::load_from_memory(&bytes)
                    .map_err(|source| LoadError::Image {
                        path: path.clone(),
                        source,
                    })?
                    .to_rgba8();
                let (width, height) = rgba.dimensions();
                let expected = *size.get_or_insert(width);
                if width != expected || height != expected {
                    return Err(LoadError::FaceSize {
                        path: path.clone(),
                        width,
                        height,
                        expected,
                    });
                }
                *slot = rgba.into_raw();
            }

            Ok(LoadedAsset::Skybox(CubeMap {
                size: size.unwrap_or(0),
                faces: decoded,
            }))
        })
    }

    fn spawn<F>(&self, kind: &str, job: F) -> LoadId
    where
        F: FnOnce(LoadId, &dyn LoadSink) -> Result<LoadedAsset, LoadError> + Send + 'static,
    {
        let id = LoadId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sink = self.sink.clone_box();
        let spawned = thread::Builder::new()
            .name(format!("load-{kind}-{}", id.0))
            .spawn(move || {
                let outcome = job(id, sink.as_ref());
                sink.deliver(LoadEvent::Finished { id, outcome });
            });
        if let Err(err) = spawned {
            self.sink.deliver(LoadEvent::Finished {
                id,
                outcome: Err(LoadError::Spawn(err)),
            });
        }
        id
    }
}

/// Reads `path` in fixed-size chunks, reporting progress after each one.
/// `offset` and `total` let several files share one progress range.
fn read_with_progress(
    path: &Path,
    id: LoadId,
    sink: &dyn LoadSink,
    offset: u64,
    total: Option<u64>,
) -> Result<Vec<u8>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    let total = total.unwrap_or(len);

    let mut bytes = Vec::with_capacity(len as usize);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut chunk).map_err(io_err)?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
        sink.deliver(LoadEvent::Progress {
            id,
            loaded: offset + bytes.len() as u64,
            total,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type Finished = (Vec<(u64, u64)>, LoadId, Result<LoadedAsset, LoadError>);

    fn finished(rx: &mpsc::Receiver<LoadEvent>) -> Finished {
        let mut progress = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                LoadEvent::Progress { loaded, total, .. } => progress.push((loaded, total)),
                LoadEvent::Finished { id, outcome } => return (progress, id, outcome),
            }
        }
    }

    #[test]
    fn missing_file_fails_without_progress() {
        let (tx, rx) = mpsc::channel();
        let loader = AssetLoader::new(tx);
        let dir = tempfile::tempdir().unwrap();

        let id = loader.load_model(dir.path().join("missing.glb"));
        let (progress, done, outcome) = finished(&rx);
        assert_eq!(done, id);
        assert!(progress.is_empty());
        assert!(matches!(outcome, Err(LoadError::Io { .. })));
    }

    #[test]
    fn large_files_report_chunked_progress() {
        let (tx, rx) = mpsc::channel();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.glb");
        std::fs::write(&path, vec![0u8; CHUNK_SIZE * 2 + 10]).unwrap();

        let loader = AssetLoader::new(tx);
        loader.load_animations(&path);
        let (progress, _, outcome) = finished(&rx);

        let total = (CHUNK_SIZE * 2 + 10) as u64;
        assert_eq!(progress.last(), Some(&(total, total)));
        assert!(progress.len() >= 3);
        assert!(progress.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(matches!(outcome, Err(LoadError::Gltf { .. })));
    }

    #[test]
    fn ids_are_unique() {
        let (tx, rx) = mpsc::channel();
        let loader = AssetLoader::new(tx);
        let a = loader.load_model("does/not/exist.glb");
        let b = loader.load_model("does/not/exist.glb");
        assert_ne!(a, b);
        let _ = finished(&rx);
        let _ = finished(&rx);
    }

    #[test]
    fn cube_map_faces_load_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["px", "nx", "py", "ny", "pz", "nz"];
        let faces = names.map(|n| dir.path().join(format!("{n}.png")));
        for (i, path) in faces.iter().enumerate() {
            let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([i as u8, 0, 0, 255]));
            img.save(path).unwrap();
        }

        let (tx, rx) = mpsc::channel();
        let loader = AssetLoader::new(tx);
        loader.load_cube_map(faces);
        let (progress, _, outcome) = finished(&rx);

        let Ok(LoadedAsset::Skybox(cube)) = outcome else {
            panic!("expected a cube map");
        };
        assert_eq!(cube.size, 2);
        for (i, face) in cube.faces.iter().enumerate() {
            assert_eq!(face.len(), 16);
            assert_eq!(face[0], i as u8);
        }
        let (loaded, total) = *progress.last().unwrap();
        assert_eq!(loaded, total);
    }

    #[test]
    fn mismatched_face_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let faces = ["a", "b", "c", "d", "e", "f"].map(|n| dir.path().join(format!("{n}.png")));
        for (i, path) in faces.iter().enumerate() {
            let size = if i == 3 { 4 } else { 2 };
            image::RgbaImage::new(size, size).save(path).unwrap();
        }

        let (tx, rx) = mpsc::channel();
        AssetLoader::new(tx).load_cube_map(faces);
        let (_, _, outcome) = finished(&rx);
        assert!(matches!(
            outcome,
            Err(LoadError::FaceSize {
                width: 4,
                expected: 2,
                ..
            })
        ));
    }
}
