#![forbid(unsafe_code)]

//! Plain-file exports of archived captions.

use anyhow::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::archive_stem;
use crate::captions::{caption_lines, timestamped_transcript};
use crate::graph::escape_xml;
use crate::layout::ProjectPaths;
use crate::reader::{ArchiveReader, CaptionKind};
use crate::store::BlobStore;

pub const CAPTIONS_SUBDIR: &str = "captions";
pub const TEI_SUBDIR: &str = "tei";

/// `export/<stem>/<kind>/` for the archive at `archive`.
pub fn export_dir(paths: &ProjectPaths, archive: &Path, kind: &str) -> Result<PathBuf> {
    Ok(paths.export.join(archive_stem(archive)?).join(kind))
}

/// Writes one `#HH:MM:SS-cc# text` transcript per video with XML captions.
/// Returns the number of files written.
pub fn export_timestamped_captions<S: BlobStore>(reader: &ArchiveReader<S>, out_dir: &Path) -> Result<usize> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let mut written = 0;
    for (video_id, xml) in reader.captions(CaptionKind::Xml)? {
        let lines = match caption_lines(&xml) {
            Ok(lines) => lines,
            Err(err) => {
                warn!("captions of {video_id} could not be parsed: {err:#}");
                continue;
            }
        };
        let path = out_dir.join(format!("{video_id}.txt"));
        fs::write(&path, timestamped_transcript(&lines))
            .with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Minimal TEI document with the title and date in the header and the
/// caption text as the body.
pub fn tei_document(title: &str, date: &str, content: &str) -> String {
    format!(
        concat!(
            "<TEI><teiHeader><fileDesc>",
            "<titleStmt><title>{title}</title></titleStmt>",
            "<publicationStmt><publisher/><pubPlace/><date when=\"{date}\"/></publicationStmt>",
            "<sourceDesc><p/></sourceDesc>",
            "</fileDesc></teiHeader>",
            "<text><body><p>{content}</p></body></text></TEI>"
        ),
        title = escape_xml(title),
        date = escape_xml(date),
        content = escape_xml(content),
    )
}

/// `<date>_<title>.xml` with `/` turned into `-` and spaces into `_`.
pub fn tei_file_name(date: &str, title: &str) -> String {
    format!("{date}_{}.xml", title.replace('/', "-")).replace(' ', "_")
}

/// Writes a TEI file for every video that has a plain-text caption.
pub fn export_tei<S: BlobStore>(reader: &ArchiveReader<S>, out_dir: &Path) -> Result<usize> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let mut written = 0;
    for video in reader.videos() {
        let Some(caption) = reader.caption(&video.id, CaptionKind::Text)? else {
            continue;
        };
        let date = video.publication_date();
        let title = video.title.replace('/', "-");
        let path = out_dir.join(tei_file_name(date, &video.title));
        fs::write(&path, tei_document(&title, date, &caption))
            .with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Opens `archive` (with its updates) and runs one of the exports into
/// `export/<stem>/<kind>/`.
pub fn export_archive(paths: &ProjectPaths, archive: &Path, kind: CaptionExport) -> Result<PathBuf> {
    let reader = ArchiveReader::open(archive)?;
    let out_dir = export_dir(paths, archive, kind.subdir())?;
    let written = match kind {
        CaptionExport::Timestamped => export_timestamped_captions(&reader, &out_dir)?,
        CaptionExport::Tei => export_tei(&reader, &out_dir)?,
    };
    info!("{written} file(s) written to {}", out_dir.display());
    Ok(out_dir)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionExport {
    Timestamped,
    Tei,
}

impl CaptionExport {
    pub fn subdir(self) -> &'static str {
        match self {
            CaptionExport::Timestamped => CAPTIONS_SUBDIR,
            CaptionExport::Tei => TEI_SUBDIR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZipArchive;
    use crate::layout::entry;
    use serde_json::json;
    use tempfile::tempdir;

    fn fill<S: BlobStore>(store: &mut S) -> Result<()> {
        store.put_json(entry::VIDEO_IDS, &json!(["v1", "v2"]))?;
        for (id, title) in [("v1", "Part 1/2 intro"), ("v2", "No captions")] {
            store.put_json(
                &entry::video_meta(id),
                &json!({"items": [{"id": id, "snippet": {"title": title, "publishedAt": "2018-07-01T12:00:00Z"}}]}),
            )?;
        }
        store.put_text(&entry::caption("v1", "txt"), "fish & chips")?;
        store.put_text(
            &entry::caption("v1", "xml"),
            r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="1.5" dur="2">hello</text><text start="3725.25" dur="1">world</text></transcript>"#,
        )?;
        Ok(())
    }

    #[test]
    fn tei_names_replace_slashes_and_spaces() {
        assert_eq!(
            tei_file_name("2018-07-01", "Part 1/2 intro"),
            "2018-07-01_Part_1-2_intro.xml"
        );
    }

    #[test]
    fn tei_document_escapes_content() {
        let xml = tei_document("A <b>", "2020-01-01", "x & y");
        assert!(xml.contains("<title>A &lt;b&gt;</title>"));
        assert!(xml.contains(r#"<date when="2020-01-01"/>"#));
        assert!(xml.contains("<body><p>x &amp; y</p></body>"));
    }

    #[test]
    fn exports_land_under_archive_stem() -> Result<()> {
        let dir = tempdir()?;
        let paths = ProjectPaths::new(dir.path());
        let archive_path = paths.channel_group("main").join("Chan.zip");
        let mut store = ZipArchive::open(&archive_path)?;
        fill(&mut store)?;

        let tei_dir = export_archive(&paths, &archive_path, CaptionExport::Tei)?;
        assert_eq!(tei_dir, paths.export.join("Chan").join(TEI_SUBDIR));
        let tei = fs::read_to_string(tei_dir.join("2018-07-01_Part_1-2_intro.xml"))?;
        assert!(tei.contains("<title>Part 1-2 intro</title>"));
        assert!(tei.contains("fish &amp; chips"));
        assert_eq!(fs::read_dir(&tei_dir)?.count(), 1);

        let captions_dir = export_archive(&paths, &archive_path, CaptionExport::Timestamped)?;
        let transcript = fs::read_to_string(captions_dir.join("v1.txt"))?;
        assert!(transcript.contains("hello"));
        assert!(transcript.contains("world"));
        assert!(!captions_dir.join("v2.txt").exists());
        Ok(())
    }
}
