use super::{LoadError, LoadOptions, sng};
use crate::game::song::{LoadSummary, SongData, SongLibrary, SongPack, SourceFormat};
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::fs;
use std::hash::Hasher;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use twox_hash::XxHash64;
use walkdir::WalkDir;

/// Extensions tried, in order, when a song does not name its audio file.
pub const AUDIO_EXTENSIONS: [&str; 4] = ["ogg", "mp3", "wav", "flac"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Parsed,
}

// --- Hashing ---

pub fn audio_md5(path: &Path) -> Result<String, LoadError> {
    let bytes = fs::read(path).map_err(|e| LoadError::io(path, e))?;
    Ok(format!("{:x}", md5::compute(bytes)))
}

/// Hash of a definition file's bytes, recorded as `SourceHash` in its cache
/// entry.
fn source_hash(path: &Path) -> Result<u64, std::io::Error> {
    fs::read(path).map(|bytes| XxHash64::oneshot(0, &bytes))
}

pub fn get_cache_path(source_path: &Path, cache_dir: &Path) -> Result<PathBuf, std::io::Error> {
    let canonical_path = source_path.canonicalize()?;
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(canonical_path.to_string_lossy().as_bytes());
    Ok(cache_dir.join(format!("{:x}.sng", hasher.finish())))
}

// --- Single song ---

fn read_song_text(path: &Path) -> Result<String, LoadError> {
    let bytes = fs::read(path).map_err(|e| LoadError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

/// Same-named audio first, then any audio file in the folder.
pub fn discover_audio(dir: &Path, stem: &str) -> Option<PathBuf> {
    for ext in AUDIO_EXTENSIONS {
        let candidate = dir.join(format!("{stem}.{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_audio_file(p))
        .collect();
    files.sort();
    files.into_iter().next()
}

/// Resolves the audio file against `song_dir` and records its hash. A
/// recorded hash that no longer matches is an error; a missing file is left
/// for validation.
fn attach_audio(song: &mut SongData, song_dir: &Path, stem: &str) -> Result<(), LoadError> {
    let path = if song.audio_file.trim().is_empty() {
        let found = discover_audio(song_dir, stem);
        if let Some(name) = found.as_ref().and_then(|p| p.file_name()) {
            song.audio_file = name.to_string_lossy().into_owned();
        }
        found
    } else {
        Some(song_dir.join(song.audio_file.trim()))
    };

    song.audio_path = path;
    let Some(audio) = song.audio_path.as_deref().filter(|p| p.is_file()) else {
        debug!("No audio file for {:?} yet.", song.definition_path);
        return Ok(());
    };
    let actual = audio_md5(audio)?;
    if !song.audio_md5.is_empty() && song.audio_md5 != actual {
        return Err(LoadError::AudioHashMismatch {
            path: audio.to_path_buf(),
            expected: std::mem::take(&mut song.audio_md5),
            actual,
        });
    }
    song.audio_md5 = actual;
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Reads, parses and resolves audio for one song definition file.
pub fn load_song(path: &Path, options: &LoadOptions) -> Result<SongData, LoadError> {
    let format = SourceFormat::from_path(path).ok_or_else(|| LoadError::UnknownFormat(path.to_path_buf()))?;
    let text = read_song_text(path)?;
    let mut song = super::parse(&text, path, format, options)?;
    let song_dir = path.parent().unwrap_or_else(|| Path::new("."));
    attach_audio(&mut song, song_dir, &file_stem(path))?;
    Ok(song)
}

fn load_song_from_cache(
    source: &Path,
    cache_path: &Path,
    content_hash: u64,
    options: &LoadOptions,
) -> Option<SongData> {
    let text = fs::read_to_string(cache_path).ok()?;
    if sng::source_hash(&text) != Some(content_hash) {
        info!("Cache stale (content hash mismatch) for: {:?}", source.file_name().unwrap_or_default());
        return None;
    }
    let mut song = match sng::parse(&text, cache_path, options) {
        Ok(song) => song,
        Err(e) => {
            warn!("Ignoring unreadable cache {cache_path:?}: {e}");
            return None;
        }
    };
    // Cache entries hold the uncalibrated timing.
    song.offset += options.offset_adjust;
    song.length += options.offset_adjust;
    song.definition_path = source.to_path_buf();
    if let Some(format) = SourceFormat::from_path(source) {
        song.format = format;
    }
    let song_dir = source.parent().unwrap_or_else(|| Path::new("."));
    if let Err(e) = attach_audio(&mut song, song_dir, &file_stem(source)) {
        info!("Cache stale for {:?}: {e}", source.file_name().unwrap_or_default());
        return None;
    }
    info!("Cache hit for: {:?}", source.file_name().unwrap_or_default());
    Some(song)
}

/// Loads one song, going through the normalized cache for DWI and SM files.
pub fn load_song_cached(path: &Path, options: &LoadOptions) -> Result<(SongData, LoadSource), LoadError> {
    if SourceFormat::from_path(path) == Some(SourceFormat::Sng) {
        return load_song(path, options).map(|s| (s, LoadSource::Parsed));
    }

    let cache_keys = options.cache_dir.as_deref().and_then(|dir| {
        let cache_path = get_cache_path(path, dir)
            .map_err(|e| warn!("Could not generate cache path for {path:?}: {e}. Caching disabled for this file."))
            .ok()?;
        let content_hash = source_hash(path)
            .map_err(|e| warn!("Could not hash content of {path:?}: {e}. Caching disabled for this file."))
            .ok()?;
        Some((cache_path, content_hash))
    });

    if options.fastload
        && let Some((cache_path, content_hash)) = &cache_keys
        && cache_path.is_file()
        && let Some(song) = load_song_from_cache(path, cache_path, *content_hash, options)
    {
        return Ok((song, LoadSource::Cache));
    }

    if options.fastload {
        info!("Cache miss for: {:?}", path.file_name().unwrap_or_default());
    }
    let song = load_song(path, options)?;
    if options.convert_to_sng
        && let Some((cache_path, content_hash)) = cache_keys
    {
        let mut entry = song.clone();
        entry.offset -= options.offset_adjust;
        entry.length -= options.offset_adjust;
        entry.read_only = false;
        if let Err(e) = sng::write(&mut entry, &cache_path, Some(content_hash)) {
            warn!("Failed to write cache file for {path:?}: {e}");
        }
    }
    Ok((song, LoadSource::Parsed))
}

// --- Library scan ---

fn fmt_elapsed(d: Duration) -> String {
    let secs = d.as_secs_f64();
    match d.as_secs() {
        0 => format!("{}ms", d.as_millis()),
        1..60 => format!("{secs:.2}s"),
        whole => {
            let minutes = whole / 60;
            format!("{minutes}m{:.1}s", secs - (minutes * 60) as f64)
        }
    }
}

/// One definition file per song folder, SNG before SM before DWI.
fn pick_definition(files: &[PathBuf]) -> Option<&PathBuf> {
    SourceFormat::PREFERENCE
        .iter()
        .find_map(|fmt| files.iter().find(|f| SourceFormat::from_path(f) == Some(*fmt)))
}

/// `root/<pack>/<song>/<file>` grouped into packs of song definition files.
fn collect_song_files(root: &Path) -> BTreeMap<String, (PathBuf, Vec<PathBuf>)> {
    let mut folders: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.map_err(|err| warn!("Skipping unreadable entry: {err}")).ok())
    {
        let path = entry.path();
        if entry.file_type().is_file()
            && SourceFormat::from_path(path).is_some()
            && let Some(parent) = path.parent()
        {
            folders.entry(parent.to_path_buf()).or_default().push(path.to_path_buf());
        }
    }

    let mut packs: BTreeMap<String, (PathBuf, Vec<PathBuf>)> = BTreeMap::new();
    for (folder, files) in folders {
        let Some(definition) = pick_definition(&files) else {
            continue;
        };
        let Some(pack_dir) = folder
            .strip_prefix(root)
            .ok()
            .and_then(|rel| rel.components().next())
            .map(|c| root.join(c))
        else {
            continue;
        };
        let name = pack_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        packs.entry(name).or_insert_with(|| (pack_dir, Vec::new())).1.push(definition.clone());
    }
    packs
}

fn sort_songs(songs: &mut [Arc<SongData>]) {
    songs.sort_by_cached_key(|song| {
        let title = song.title.to_lowercase();
        let special = title.chars().next().is_some_and(|c| !c.is_alphanumeric());
        (special, title)
    });
}

/// Library position of a song: pack, then file within the pack.
type SongSlot = (usize, usize);

type ParseMsg = (SongSlot, PathBuf, Result<(SongData, LoadSource), LoadError>);

#[derive(Default)]
struct ScanState {
    packs: Vec<SongPack>,
    summary: LoadSummary,
    valid: Vec<(SongSlot, PathBuf, SongData)>,
}

impl ScanState {
    /// Records a finished load. Results arrive in completion order, so
    /// duplicates are resolved later in [`Self::finish`].
    fn accept(&mut self, slot: SongSlot, path: PathBuf, result: Result<(SongData, LoadSource), LoadError>) {
        let (song, source) = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                self.summary.failed += 1;
                warn!("Failed to load '{path:?}': {e}");
                return;
            }
        };
        match source {
            LoadSource::Cache => self.summary.cache_hits += 1,
            LoadSource::Parsed => self.summary.parsed += 1,
        }
        if let Err(e) = song.validate() {
            self.summary.failed += 1;
            warn!("Failed to load '{path:?}': {e}");
            return;
        }
        self.valid.push((slot, path, song));
    }

    /// Places valid songs into their packs in library order; the first song
    /// for a given audio hash wins.
    fn finish(mut self) -> (Vec<SongPack>, LoadSummary) {
        self.valid.sort_by_key(|(slot, _, _)| *slot);
        let mut seen_audio: FxHashSet<String> = FxHashSet::default();
        for ((pack_idx, _), path, song) in self.valid {
            if !seen_audio.insert(song.audio_md5.clone()) {
                self.summary.duplicates += 1;
                info!("Skipping {path:?}: same audio as an already loaded song.");
                continue;
            }
            if let Some(pack) = self.packs.get_mut(pack_idx) {
                pack.songs.push(Arc::new(song));
            }
        }
        (self.packs, self.summary)
    }
}

fn reap_one(rx: &std::sync::mpsc::Receiver<ParseMsg>, in_flight: &mut usize, state: &mut ScanState) {
    match rx.recv() {
        Ok((slot, path, result)) => {
            *in_flight = in_flight.saturating_sub(1);
            state.accept(slot, path, result);
        }
        Err(_) => *in_flight = 0,
    }
}

fn parse_thread_count(requested: u8) -> usize {
    let avail_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    match requested {
        0 => avail_threads,
        1 => 1,
        n => usize::from(n).min(avail_threads).max(1),
    }
}

/// Scans `root` for song folders, loads every song and returns the playable
/// library. Broken songs are logged and counted, never fatal.
pub fn scan_and_load_songs(root: &Path, options: &LoadOptions) -> SongLibrary {
    info!("Starting song scan in '{}'...", root.display());
    let started = Instant::now();

    if !root.is_dir() {
        warn!("Songs directory '{}' not found. No songs will be loaded.", root.display());
        return SongLibrary::default();
    }

    let mut options = options.clone();
    if let Some(cache_dir) = options.cache_dir.as_deref()
        && let Err(e) = fs::create_dir_all(cache_dir)
    {
        warn!("Could not create cache directory '{}': {e}. Caching will be disabled.", cache_dir.display());
        options.cache_dir = None;
    }

    let parse_threads = parse_thread_count(options.parsing_threads);
    let runtime = if parse_threads > 1 {
        tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(parse_threads)
            .build()
            .map_err(|e| warn!("Could not start parser pool: {e}. Parsing on this thread."))
            .ok()
    } else {
        None
    };
    let (tx, rx) = std::sync::mpsc::channel::<ParseMsg>();
    let mut in_flight = 0usize;
    let mut state = ScanState::default();
    let shared_options = Arc::new(options);

    let mut collected: Vec<_> = collect_song_files(root).into_iter().collect();
    collected.sort_by_cached_key(|(name, _)| name.to_ascii_lowercase());

    for (name, (directory, files)) in collected {
        info!("Scanning pack: {name}");
        let pack_idx = state.packs.len();
        state.packs.push(SongPack { name, directory, songs: Vec::new() });

        for (song_idx, path) in files.into_iter().enumerate() {
            let slot = (pack_idx, song_idx);
            let Some(rt) = runtime.as_ref() else {
                let result = load_song_cached(&path, &shared_options);
                state.accept(slot, path, result);
                continue;
            };

            while in_flight >= parse_threads {
                reap_one(&rx, &mut in_flight, &mut state);
            }
            let tx = tx.clone();
            let options = Arc::clone(&shared_options);
            rt.handle().spawn_blocking(move || {
                let out = catch_unwind(AssertUnwindSafe(|| load_song_cached(&path, &options)))
                    .unwrap_or_else(|_| Err(LoadError::Panicked(path.clone())));
                let _ = tx.send((slot, path, out));
            });
            in_flight += 1;
        }
    }

    while in_flight > 0 {
        reap_one(&rx, &mut in_flight, &mut state);
    }
    if runtime.is_some() {
        info!(
            "Song parsing: used {parse_threads} threads (SongParsingThreads={}).",
            shared_options.parsing_threads
        );
    }

    let (mut packs, mut summary) = state.finish();
    packs.retain(|p| !p.songs.is_empty());
    for pack in &mut packs {
        sort_songs(&mut pack.songs);
    }

    summary.loaded = packs.iter().map(|p| p.songs.len()).sum();
    info!(
        "Finished scan. Found {} packs / {} songs (parsed {}, cache hits {}, failed {}, duplicates {}) in {}.",
        packs.len(),
        summary.loaded,
        summary.parsed,
        summary.cache_hits,
        summary.failed,
        summary.duplicates,
        fmt_elapsed(started.elapsed())
    );
    SongLibrary { packs, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wgibeat-simfile-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    const DWI: &str = "#TITLE:Alpha;#ARTIST:A;#BPM:120;#GAP:0;#SINGLE:BASIC:2:00008000;";

    #[test]
    fn audio_is_discovered_by_stem_then_any() {
        let dir = scratch_dir("discover");
        fs::write(dir.join("other.mp3"), b"x").expect("write");
        assert_eq!(discover_audio(&dir, "song"), Some(dir.join("other.mp3")));
        fs::write(dir.join("song.wav"), b"y").expect("write");
        assert_eq!(discover_audio(&dir, "song"), Some(dir.join("song.wav")));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_song_hashes_discovered_audio() {
        let dir = scratch_dir("load");
        let song_path = dir.join("alpha.dwi");
        fs::write(&song_path, DWI).expect("write");
        fs::write(dir.join("alpha.ogg"), b"not really audio").expect("write");

        let song = load_song(&song_path, &LoadOptions::default()).expect("loads");
        assert_eq!(song.audio_file, "alpha.ogg");
        assert_eq!(song.audio_md5, format!("{:x}", md5::compute(b"not really audio")));
        assert!(song.validate().is_ok());
        assert!(song.verify_audio().is_ok());

        fs::write(dir.join("alpha.ogg"), b"changed").expect("write");
        assert!(matches!(song.verify_audio(), Err(LoadError::AudioHashMismatch { .. })));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn cache_is_written_then_preferred() {
        let dir = scratch_dir("cache");
        let song_dir = dir.join("songs/pack/alpha");
        fs::create_dir_all(&song_dir).expect("dirs");
        let song_path = song_dir.join("alpha.dwi");
        fs::write(&song_path, DWI).expect("write");
        fs::write(song_dir.join("alpha.ogg"), b"tone").expect("write");

        let options = LoadOptions {
            convert_to_sng: true,
            fastload: true,
            cache_dir: Some(dir.join("cache")),
            ..LoadOptions::default()
        };
        fs::create_dir_all(dir.join("cache")).expect("cache dir");

        let (first, source) = load_song_cached(&song_path, &options).expect("parses");
        assert_eq!(source, LoadSource::Parsed);
        assert!(first.read_only);
        let cache_path = get_cache_path(&song_path, &dir.join("cache")).expect("cache path");
        assert!(cache_path.is_file());

        let (second, source) = load_song_cached(&song_path, &options).expect("cached");
        assert_eq!(source, LoadSource::Cache);
        assert_eq!(second.title, "Alpha");
        assert_eq!(second.definition_path, song_path);
        assert_eq!(second.bpms, first.bpms);
        assert!((second.offset - first.offset).abs() < 1e-3);

        // Editing the source invalidates the cache.
        fs::write(&song_path, DWI.replace("Alpha", "Beta")).expect("write");
        let (third, source) = load_song_cached(&song_path, &options).expect("reparsed");
        assert_eq!(source, LoadSource::Parsed);
        assert_eq!(third.title, "Beta");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn library_scan_prefers_formats_and_skips_broken_songs() {
        let dir = scratch_dir("scan");
        let root = dir.join("songs");
        let write_song = |pack: &str, song: &str, file: &str, text: &str, audio: &[u8]| {
            let song_dir = root.join(pack).join(song);
            fs::create_dir_all(&song_dir).expect("dirs");
            fs::write(song_dir.join(file), text).expect("write");
            if !audio.is_empty() {
                fs::write(song_dir.join("music.ogg"), audio).expect("write");
            }
        };
        write_song("Pack B", "alpha", "alpha.dwi", DWI, b"a");
        write_song(
            "Pack B",
            "alpha",
            "alpha.sng",
            "#SONG-1.0;Title=alpha sng;Bpm=120;Offset=0;Length=30;AudioFile=music.ogg;",
            b"a",
        );
        write_song("Pack B", "beta", "beta.dwi", &DWI.replace("Alpha", "!Beta"), b"b");
        write_song("Pack A", "gamma", "gamma.dwi", &DWI.replace("Alpha", "Gamma"), b"c");
        write_song("Pack A", "dupe", "dupe.dwi", &DWI.replace("Alpha", "Dupe"), b"c");
        write_song("Pack A", "silent", "silent.dwi", &DWI.replace("Alpha", "Silent"), b"");
        write_song("Pack A", "broken", "broken.dwi", "#TITLE:Broken;", b"d");

        let library = scan_and_load_songs(&root, &LoadOptions::default());
        let names: Vec<&str> = library.packs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Pack A", "Pack B"]);
        let titles: Vec<&str> = library.packs[1].songs.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["alpha sng", "!Beta"]);
        assert_eq!(library.packs[0].songs.len(), 1);
        assert_eq!(library.summary.loaded, 3);
        assert_eq!(library.summary.failed, 2);
        assert_eq!(library.summary.duplicates, 1);
        // Folder order decides which copy of shared audio is kept.
        assert!(library.find_by_title("DUPE").is_some());
        assert!(library.find_by_title("Gamma").is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn scan_of_missing_root_is_empty() {
        let library = scan_and_load_songs(Path::new("/definitely/not/here"), &LoadOptions::default());
        assert!(library.packs.is_empty());
        assert_eq!(library.summary, LoadSummary::default());
    }

    #[test]
    fn elapsed_time_formats() {
        assert_eq!(fmt_elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(fmt_elapsed(Duration::from_millis(1500)), "1.50s");
        assert_eq!(fmt_elapsed(Duration::from_millis(125_500)), "2m5.5s");
    }
}
