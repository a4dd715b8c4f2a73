use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use wgibeat::game::parsing::{LoadOptions, simfile};
use wgibeat::game::song::{ChartDifficulty, SourceFormat};

const EPS: f64 = 1e-6;

const DWI: &str = "#TITLE:Rebased;\n#ARTIST:Someone;\n#BPM:120;\n#CHANGEBPM:32=240;\n#FREEZE:48=500;\n\
                   #SINGLE:BASIC:3:0000000080000000;\n\
                   #SINGLE:MANIAC:9:000000008000000080000000800;\n";

const SM: &str = "#TITLE:Another Song;\n#ARTIST:Band;\n#MUSIC:another.ogg;\n#OFFSET:-0.250;\n\
                  #BPMS:0.000=150.000;\n#STOPS:;\n\
                  #NOTES:\n     dance-single:\n     :\n     Medium:\n     5:\n     0,0,0,0,0:\n\
                  1000\n0100\n0010\n0001\n,\n0000\n0000\n0000\n1001\n;\n";

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wgibeat-it-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

fn write(path: &Path, contents: &[u8]) {
    fs::create_dir_all(path.parent().expect("has parent")).expect("dirs");
    fs::write(path, contents).expect("write");
}

#[test]
fn library_scan_uses_the_cache_on_the_second_pass() {
    let dir = scratch("library");
    let songs = dir.join("songs");
    write(&songs.join("Pack/rebased/rebased.dwi"), DWI.as_bytes());
    write(&songs.join("Pack/rebased/rebased.ogg"), b"rebased audio");
    write(&songs.join("Pack/another/another.sm"), SM.as_bytes());
    write(&songs.join("Pack/another/another.ogg"), b"another audio");

    let options = LoadOptions {
        convert_to_sng: true,
        fastload: true,
        cache_dir: Some(dir.join("cache")),
        parsing_threads: 2,
        ..LoadOptions::default()
    };

    let first = simfile::scan_and_load_songs(&songs, &options);
    assert_eq!(first.summary.loaded, 2);
    assert_eq!((first.summary.parsed, first.summary.cache_hits), (2, 0));
    let titles: Vec<&str> = first.songs().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Another Song", "Rebased"]);

    let second = simfile::scan_and_load_songs(&songs, &options);
    assert_eq!((second.summary.parsed, second.summary.cache_hits), (0, 2));

    for (a, b) in first.songs().zip(second.songs()) {
        assert_eq!(a.title, b.title);
        assert_eq!(a.bpms, b.bpms);
        assert_eq!(a.stops, b.stops);
        assert_eq!(a.audio_md5, b.audio_md5);
        assert_eq!(a.definition_path, b.definition_path);
        assert!((a.offset - b.offset).abs() < 1e-3);
        assert!((a.length - b.length).abs() < 1e-3);
    }

    let rebased = second.find_by_title("rebased").expect("loaded");
    assert_eq!(rebased.format, SourceFormat::Dwi);
    assert!(rebased.verify_audio().is_ok());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn dwi_timing_is_rebased_onto_the_first_step() {
    let dir = scratch("dwi");
    let path = dir.join("rebased.dwi");
    write(&path, DWI.as_bytes());
    write(&dir.join("rebased.ogg"), b"tone");

    let song = simfile::load_song(&path, &LoadOptions::default()).expect("loads");
    assert_eq!(song.chart.as_ref().map(|c| c.difficulty), Some(ChartDifficulty::Maniac));
    assert_eq!(song.bpms, vec![(0.0, 120.0), (1.0, 240.0)]);
    // 500 ms at 240 BPM.
    assert_eq!(song.stops, vec![(2.0, 2.0)]);
    assert!((song.offset - 2.0).abs() < EPS);

    let map = song.timing_map();
    assert!((map.phrase_to_ms(1.0) - 2000.0).abs() < EPS);
    assert!((map.phrase_to_ms(2.0) - 3000.0).abs() < EPS);
    // The stop holds phrase 2 for half a second.
    assert!((map.ms_to_phrase(3250.0) - 2.0).abs() < EPS);
    assert!((map.ms_to_phrase(4500.0) - 3.0).abs() < EPS);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn sm_song_keeps_its_own_beat_zero() {
    let dir = scratch("sm");
    let path = dir.join("another.sm");
    write(&path, SM.as_bytes());
    write(&dir.join("another.ogg"), b"tone");

    let song = simfile::load_song(&path, &LoadOptions { offset_adjust: 0.1, ..LoadOptions::default() })
        .expect("loads");
    assert_eq!(song.bpms, vec![(0.0, 150.0)]);
    assert!((song.offset - 0.35).abs() < EPS);
    // Last step at phrase 1.75, plus an eighth: 1.875 phrases at 150 BPM = 3 s.
    assert!((song.length - 3.35).abs() < EPS);
    assert_eq!(song.audio_path.as_deref(), Some(dir.join("another.ogg").as_path()));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cached_song_follows_the_current_offset_adjust() {
    let dir = scratch("adjust");
    let path = dir.join("songs/Pack/rebased/rebased.dwi");
    write(&path, DWI.as_bytes());
    write(&dir.join("songs/Pack/rebased/rebased.ogg"), b"tone");
    let cache_dir = dir.join("cache");
    fs::create_dir_all(&cache_dir).expect("cache dir");

    let options = LoadOptions {
        convert_to_sng: true,
        fastload: true,
        cache_dir: Some(cache_dir),
        offset_adjust: 0.25,
        ..LoadOptions::default()
    };
    let (first, source) = simfile::load_song_cached(&path, &options).expect("parses");
    assert_eq!(source, simfile::LoadSource::Parsed);
    assert!((first.offset - 2.25).abs() < 1e-3);

    let recalibrated = LoadOptions { offset_adjust: -0.5, ..options.clone() };
    let (cached, source) = simfile::load_song_cached(&path, &recalibrated).expect("cached");
    assert_eq!(source, simfile::LoadSource::Cache);
    let fresh = simfile::load_song(&path, &recalibrated).expect("parses");
    assert!((cached.offset - 1.5).abs() < 1e-3);
    assert!((cached.offset - fresh.offset).abs() < 1e-3);
    assert!((cached.length - fresh.length).abs() < 1e-3);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn shared_audio_keeps_the_copy_from_the_first_pack() {
    let dir = scratch("shared-audio");
    let songs = dir.join("songs");
    // A long chart in the first pack so a parallel scan tends to finish it last.
    let long_chart = format!("#TITLE:First Copy;\n#ARTIST:A;\n#BPM:120;\n#SINGLE:MANIAC:9:{};\n", "8".repeat(20_000));
    write(&songs.join("a pack/song/song.dwi"), long_chart.as_bytes());
    write(&songs.join("a pack/song/song.ogg"), b"same audio");
    write(
        &songs.join("B Pack/song/song.dwi"),
        b"#TITLE:Second Copy;\n#ARTIST:B;\n#BPM:120;\n#SINGLE:MANIAC:9:8;\n",
    );
    write(&songs.join("B Pack/song/song.ogg"), b"same audio");

    let options = LoadOptions { parsing_threads: 4, cache_dir: None, ..LoadOptions::default() };
    for _ in 0..3 {
        let library = simfile::scan_and_load_songs(&songs, &options);
        assert_eq!(library.summary.loaded, 1);
        assert_eq!(library.summary.duplicates, 1);
        let names: Vec<&str> = library.packs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a pack"]);
        assert!(library.find_by_title("First Copy").is_some());
    }
    let _ = fs::remove_dir_all(&dir);
}
