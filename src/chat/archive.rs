//! Portable session archive: a deflate-compressed zip holding one
//! `data.json` plus sibling members with the raw bytes of every binary
//! segment.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::segment::{FilePayload, Segment, SegmentKind};
use super::turn::{Role, Turn};

/// Stands in for raw bytes inside `data.json`; the real content lives in
/// a sibling archive member named `{file_id}-{filename}`.
const BINARY_PLACEHOLDER: &str = "<binary>";

const FALLBACK_FILENAME: &str = "file.bin";

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveData {
    saved_at: DateTime<Utc>,
    model: String,
    instructions: String,
    turns: Vec<TurnRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TurnRecord {
    role: Role,
    blocks: Vec<BlockRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlockRecord {
    category: SegmentKind,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<String>,
}

/// A reconstructed session archive.
pub struct LoadedArchive {
    pub saved_at: DateTime<Utc>,
    pub model: String,
    pub instructions: String,
    pub turns: Vec<Turn>,
}

fn member_name(file_id: &str, filename: &str) -> String {
    format!("{}-{}", file_id, filename)
}

/// Save the given turns to `path`. The path must end in `.zip`.
pub fn save(path: &Path, model: &str, instructions: &str, turns: &[Turn]) -> Result<()> {
    let Some(path_str) = path.to_str() else {
        bail!("Archive path is not valid UTF-8: {}", path.display());
    };
    if !path_str.ends_with(".zip") {
        bail!("Archive path must end with .zip: {}", path_str);
    }

    let mut records = Vec::new();
    // (member name, bytes) pairs written after data.json
    let mut binaries: Vec<(String, Vec<u8>)> = Vec::new();

    for turn in turns {
        let mut blocks = Vec::new();
        for segment in turn.segments() {
            let record = match segment {
                Segment::Text(s) | Segment::Code(s) | Segment::Reasoning(s) => BlockRecord {
                    category: segment.kind(),
                    content: s.clone(),
                    filename: None,
                    file_id: None,
                },
                Segment::Image(p)
                | Segment::GeneratedImage(p)
                | Segment::Upload(p)
                | Segment::Download(p) => {
                    let file_id = p
                        .file_id
                        .clone()
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    let filename = p
                        .filename
                        .clone()
                        .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
                    binaries.push((member_name(&file_id, &filename), p.bytes.clone()));
                    BlockRecord {
                        category: segment.kind(),
                        content: BINARY_PLACEHOLDER.to_string(),
                        filename: Some(filename),
                        file_id: Some(file_id),
                    }
                }
            };
            blocks.push(record);
        }
        records.push(TurnRecord {
            role: turn.role,
            blocks,
        });
    }

    let data = ArchiveData {
        saved_at: Utc::now(),
        model: model.to_string(),
        instructions: instructions.to_string(),
        turns: records,
    };

    let file = File::create(path).with_context(|| format!("Creating archive {}", path_str))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file("data.json", options)?;
    writer.write_all(&serde_json::to_vec_pretty(&data)?)?;

    for (name, bytes) in &binaries {
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;
    }
    writer.finish()?;

    Ok(())
}

/// Load an archive previously written by [`save`], reconstructing the
/// turns with bytes-for-bytes identical binary segments.
pub fn load(path: &Path) -> Result<LoadedArchive> {
    let Some(path_str) = path.to_str() else {
        bail!("Archive path is not valid UTF-8: {}", path.display());
    };
    if !path_str.ends_with(".zip") {
        bail!("Archive path must end with .zip: {}", path_str);
    }

    let file = File::open(path).with_context(|| format!("Opening archive {}", path_str))?;
    let mut archive = ZipArchive::new(file)?;

    let data: ArchiveData = {
        let mut raw = String::new();
        archive
            .by_name("data.json")
            .context("Archive is missing data.json")?
            .read_to_string(&mut raw)?;
        serde_json::from_str(&raw)?
    };

    let mut turns = Vec::new();
    for record in &data.turns {
        let mut segments = Vec::new();
        for block in &record.blocks {
            let segment = if block.category.is_textual() {
                match block.category {
                    SegmentKind::Text => Segment::Text(block.content.clone()),
                    SegmentKind::Code => Segment::Code(block.content.clone()),
                    _ => Segment::Reasoning(block.content.clone()),
                }
            } else {
                let file_id = block.file_id.clone().unwrap_or_default();
                let filename = block
                    .filename
                    .clone()
                    .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
                let mut bytes = Vec::new();
                archive
                    .by_name(&member_name(&file_id, &filename))
                    .with_context(|| format!("Archive is missing member for {}", file_id))?
                    .read_to_end(&mut bytes)?;
                let payload = FilePayload::new(bytes, Some(filename), Some(file_id));
                match block.category {
                    SegmentKind::Image => Segment::Image(payload),
                    SegmentKind::GeneratedImage => Segment::GeneratedImage(payload),
                    SegmentKind::Upload => Segment::Upload(payload),
                    _ => Segment::Download(payload),
                }
            };
            segments.push(segment);
        }
        turns.push(Turn::with_segments(record.role, segments));
    }

    Ok(LoadedArchive {
        saved_at: data.saved_at,
        model: data.model,
        instructions: data.instructions,
        turns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_turns() -> Vec<Turn> {
        vec![
            Turn::with_segments(Role::User, vec![Segment::Text("Plot this".to_string())]),
            Turn::with_segments(
                Role::Assistant,
                vec![
                    Segment::Text("Here you go".to_string()),
                    Segment::Code("plot(x)".to_string()),
                    Segment::Image(FilePayload::new(
                        vec![0x89, 0x50, 0x4e, 0x47],
                        Some("plot.png".to_string()),
                        Some("cfile_1".to_string()),
                    )),
                ],
            ),
            Turn::with_segments(
                Role::Assistant,
                vec![Segment::Download(FilePayload::new(
                    b"col1,col2\n1,2\n".to_vec(),
                    Some("out.csv".to_string()),
                    None,
                ))],
            ),
        ]
    }

    #[test]
    fn test_round_trip_preserves_roles_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.zip");
        let turns = mixed_turns();

        save(&path, "gpt-4o", "be brief", &turns).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.model, "gpt-4o");
        assert_eq!(loaded.instructions, "be brief");
        assert_eq!(loaded.turns.len(), turns.len());

        for (orig, restored) in turns.iter().zip(loaded.turns.iter()) {
            assert_eq!(orig.role, restored.role);
            assert_eq!(orig.segments().len(), restored.segments().len());
            for (a, b) in orig.segments().iter().zip(restored.segments().iter()) {
                assert_eq!(a.kind(), b.kind());
                assert_eq!(a.text(), b.text());
                if let (Some(pa), Some(pb)) = (a.payload(), b.payload()) {
                    // bytes-for-bytes for binary segments
                    assert_eq!(pa.bytes, pb.bytes);
                    assert_eq!(pa.filename, pb.filename);
                }
            }
        }
    }

    #[test]
    fn test_binary_content_is_a_placeholder_in_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.zip");
        save(&path, "gpt-4o", "", &mixed_turns()).unwrap();

        let file = File::open(&path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let mut raw = String::new();
        archive
            .by_name("data.json")
            .unwrap()
            .read_to_string(&mut raw)
            .unwrap();

        let data: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let image_block = &data["turns"][1]["blocks"][2];
        assert_eq!(image_block["category"], "image");
        assert_eq!(image_block["content"], BINARY_PLACEHOLDER);
        assert_eq!(image_block["file_id"], "cfile_1");
    }

    #[test]
    fn test_rejects_non_zip_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tar");
        assert!(save(&path, "gpt-4o", "", &[]).is_err());
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_generated_uuid_when_no_remote_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.zip");
        save(&path, "gpt-4o", "", &mixed_turns()).unwrap();

        let loaded = load(&path).unwrap();
        let payload = loaded.turns[2].segments()[0].payload().unwrap();
        // A member id was minted at save time and survives the round trip
        assert!(payload.file_id.as_ref().is_some_and(|id| !id.is_empty()));
        assert_eq!(payload.bytes, b"col1,col2\n1,2\n".to_vec());
    }
}
