/*! Standoff annotations

Annotations are tab-separated rows without header:

```text
docID   type    start   end     conceptID   content
```

where `start`/`end` are character offsets into the document content (markup included).

Two operations are provided:

- [merge_annotations] groups the annotations of each document by (type, concept ID) and attaches
  them to the document content, read from the files listed in a docs file.
  The result is written as one JSON record per document by [write_documents].
- [conjoin_concepts] replaces the concept ID of every annotation by the sorted, `/`-joined
  set of concept IDs of its document, so that related concepts (a drug and its main ingredient)
  are treated as a single entity.
!*/
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{BufRead, Read, Write};

use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::error::Error;
use crate::io::writer::json_ascii;

/// Column names of annotation rows, in order.
pub const ANNOTATION_FIELDS: [&str; 6] =
    ["docID", "type", "start", "end", "conceptID", "content"];

lazy_static! {
    // restricted length and character set for document IDs
    static ref DOC_ID: Regex = Regex::new(r"^[[:word:]~@#%^*+/]{1,80}$").unwrap();
}

/// A single standoff annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub doc_id: String,
    pub kind: String,
    pub start: usize,
    pub end: usize,
    pub concept_id: String,
    /// Annotated text, used to pick glosses.
    pub content: String,
}

/// Annotations sharing a document, a type and a concept ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationGroup {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "conceptID")]
    pub concept_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
    /// Sorted `(start, end)` pairs.
    pub offsets: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    #[serde(rename = "docID")]
    pub doc_id: String,
    /// File the content was read from.
    pub source: String,
    pub content: String,
    pub annotations: Vec<AnnotationGroup>,
}

/// Read the docs file: whitespace-separated `docID filename` lines.
///
/// Lines that are too short, have a malformed ID or point to an unreadable file are skipped
/// with a warning.
pub fn read_docs<R: BufRead>(reader: R) -> Result<Vec<Document>, Error> {
    let mut docs = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let (doc_id, path) = match (fields.next(), fields.next()) {
            (Some(doc_id), Some(path)) => (doc_id, path),
            _ => {
                warn!("skipping docs line {}: short line", idx + 1);
                continue;
            }
        };
        if !DOC_ID.is_match(doc_id) {
            warn!("skipping docs line {}: bad ID format {:?}", idx + 1, doc_id);
            continue;
        }
        match fs::read_to_string(path) {
            Ok(content) => docs.push(Document {
                doc_id: doc_id.to_string(),
                source: path.to_string(),
                content,
                annotations: Vec::new(),
            }),
            Err(e) => warn!("skipping docs line {}: {}: {}", idx + 1, path, e),
        }
    }
    Ok(docs)
}

fn field(record: &StringRecord, idx: usize, line: usize) -> Result<&str, Error> {
    record.get(idx).ok_or_else(|| Error::MissingField {
        line,
        field: ANNOTATION_FIELDS[idx].to_string(),
    })
}

fn offset(record: &StringRecord, idx: usize, line: usize) -> Result<usize, Error> {
    let value = field(record, idx, line)?;
    value
        .trim()
        .parse()
        .map_err(|_| Error::Custom(format!("line {}: bad offset {:?}", line, value)))
}

/// Read tab-separated annotations. Extra columns are ignored, a missing content is empty.
pub fn read_annotations<R: Read>(reader: R) -> Result<Vec<Annotation>, Error> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut annotations = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        let line = idx + 1;
        let (start, end) = (offset(&record, 2, line)?, offset(&record, 3, line)?);
        if start > end {
            return Err(Error::Custom(format!(
                "line {}: bad offsets {}-{}",
                line, start, end
            )));
        }
        annotations.push(Annotation {
            doc_id: field(&record, 0, line)?.to_string(),
            kind: field(&record, 1, line)?.to_string(),
            start,
            end,
            concept_id: field(&record, 4, line)?.to_string(),
            content: record.get(5).unwrap_or_default().to_string(),
        });
    }
    debug!("read {} annotations", annotations.len());
    Ok(annotations)
}

/// Pick a representative string: the most frequent one (case-insensitively), then the longest.
///
/// Within a case-insensitive group, the first spelling met is used.
pub fn pick_gloss<'a, I>(contents: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut contents: Vec<&str> = contents.into_iter().collect();
    contents.sort_by_cached_key(|c| c.to_lowercase());
    let groups = contents.iter().group_by(|c| c.to_lowercase());
    let best = groups
        .into_iter()
        .map(|(_, group)| {
            let group: Vec<&&str> = group.collect();
            (group.len(), group[0].len(), *group[0])
        })
        .max();
    best.map(|(_, _, gloss)| gloss.to_string())
}

/// Attach annotations to their documents, grouped by (type, concept ID).
///
/// Documents are returned sorted by ID, and their groups by (type, concept ID).
/// An annotation on a document absent from `docs` is an error.
pub fn merge_annotations(
    docs: Vec<Document>,
    annotations: &[Annotation],
    glosses: bool,
) -> Result<Vec<Document>, Error> {
    let mut by_id: BTreeMap<String, Document> = BTreeMap::new();
    for doc in docs {
        if let Some(previous) = by_id.insert(doc.doc_id.clone(), doc) {
            warn!("duplicate document {}, keeping the last one", previous.doc_id);
        }
    }

    let mut groups: BTreeMap<(&str, &str, &str), Vec<&Annotation>> = BTreeMap::new();
    for a in annotations {
        groups
            .entry((a.doc_id.as_str(), a.kind.as_str(), a.concept_id.as_str()))
            .or_default()
            .push(a);
    }

    for ((doc_id, kind, concept_id), members) in groups {
        let doc = by_id.get_mut(doc_id).ok_or_else(|| {
            Error::Custom(format!("annotations on unknown document {:?}", doc_id))
        })?;
        let offsets = members.iter().map(|a| (a.start, a.end)).sorted().collect();
        let gloss = if glosses {
            pick_gloss(members.iter().map(|a| a.content.as_str()))
        } else {
            None
        };
        doc.annotations.push(AnnotationGroup {
            kind: kind.to_string(),
            concept_id: concept_id.to_string(),
            gloss,
            offsets,
        });
    }

    let nb_bare = by_id.values().filter(|d| d.annotations.is_empty()).count();
    if nb_bare > 0 {
        warn!("{} documents without annotations", nb_bare);
    }
    Ok(by_id.into_values().collect())
}

/// One JSON record per document and line, keys sorted and non-ASCII escaped.
pub fn write_documents<W: Write>(mut writer: W, docs: &[Document]) -> Result<(), Error> {
    for doc in docs {
        writeln!(writer, "{}", json_ascii(&serde_json::to_value(doc)?)?)?;
    }
    Ok(())
}

/// Document counts from [conjoin_concepts].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConjoinStats {
    pub documents: usize,
    /// Documents with more than one distinct concept ID.
    pub merged: usize,
}

/// Replace every concept ID by the sorted set of its document's concept IDs, joined by `delimiter`.
pub fn conjoin_concepts(annotations: &mut [Annotation], delimiter: &str) -> ConjoinStats {
    let mut concepts: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for a in annotations.iter() {
        concepts
            .entry(a.doc_id.as_str())
            .or_default()
            .insert(a.concept_id.as_str());
    }
    let stats = ConjoinStats {
        documents: concepts.len(),
        merged: concepts.values().filter(|c| c.len() > 1).count(),
    };
    let joined: HashMap<String, String> = concepts
        .into_iter()
        .map(|(doc_id, ids)| (doc_id.to_string(), ids.into_iter().join(delimiter)))
        .collect();

    for a in annotations.iter_mut() {
        if let Some(concept_id) = joined.get(&a.doc_id) {
            a.concept_id.clone_from(concept_id);
        }
    }
    info!(
        "{} documents, {} with merged annotations",
        stats.documents, stats.merged
    );
    stats
}

/// Write annotations back as tab-separated rows.
pub fn write_annotations<W: Write>(
    mut writer: W,
    annotations: &[Annotation],
) -> Result<(), Error> {
    for a in annotations {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}",
            a.doc_id, a.kind, a.start, a.end, a.concept_id, a.content
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn annotation(
        doc_id: &str,
        kind: &str,
        span: (usize, usize),
        concept_id: &str,
        content: &str,
    ) -> Annotation {
        Annotation {
            doc_id: doc_id.to_string(),
            kind: kind.to_string(),
            start: span.0,
            end: span.1,
            concept_id: concept_id.to_string(),
            content: content.to_string(),
        }
    }

    fn doc(doc_id: &str, content: &str) -> Document {
        Document {
            doc_id: doc_id.to_string(),
            source: format!("{}.txt", doc_id),
            content: content.to_string(),
            annotations: Vec::new(),
        }
    }

    #[test]
    fn docs_file() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.txt");
        fs::write(&first, "<p>Aspirin</p>\n").unwrap();
        let list = format!(
            "d1 {}\nshort\nbad-id {}\nd2 {}\n",
            first.display(),
            first.display(),
            dir.path().join("absent.txt").display()
        );

        let docs = read_docs(list.as_bytes()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doc_id, "d1");
        assert_eq!(docs[0].content, "<p>Aspirin</p>\n");
        assert_eq!(docs[0].source, first.display().to_string());
    }

    #[test]
    fn annotation_rows() {
        let input = "d1\tDrug\t3\t10\tC1\tAspirin\textra\nd1\tDrug\t12\t15\tC2\n";
        let annotations = read_annotations(input.as_bytes()).unwrap();
        assert_eq!(annotations[0], annotation("d1", "Drug", (3, 10), "C1", "Aspirin"));
        assert_eq!(annotations[1].content, "");

        assert!(read_annotations("d1\tDrug\t5\t4\tC1\tx\n".as_bytes()).is_err());
        assert!(read_annotations("d1\tDrug\t-1\t4\tC1\tx\n".as_bytes()).is_err());
        assert!(matches!(
            read_annotations("d1\tDrug\t1\t4\n".as_bytes()),
            Err(Error::MissingField { line: 1, .. })
        ));
    }

    #[test]
    fn glosses() {
        assert_eq!(
            pick_gloss(vec!["ASA", "Aspirin", "aspirin", "Acetylsalicylic acid"]),
            Some("Aspirin".to_string())
        );
        // same count: longest wins
        assert_eq!(pick_gloss(vec!["ASA", "Aspirin"]), Some("Aspirin".to_string()));
        assert_eq!(pick_gloss(Vec::new()), None);
    }

    #[test]
    fn merge() {
        let docs = vec![doc("d2", "second"), doc("d1", "first")];
        let annotations = vec![
            annotation("d1", "Drug", (20, 27), "C7", "aspirin"),
            annotation("d1", "Drug", (0, 7), "C7", "Aspirin"),
            annotation("d1", "Disease", (9, 17), "C3", "headache"),
        ];
        let merged = merge_annotations(docs, &annotations, true).unwrap();

        let ids: Vec<&str> = merged.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert!(merged[1].annotations.is_empty());

        let groups = &merged[0].annotations;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].kind, "Disease");
        assert_eq!(groups[1].offsets, vec![(0, 7), (20, 27)]);
        // first spelling met in the most frequent group
        assert_eq!(groups[1].gloss.as_deref(), Some("aspirin"));

        let unknown = vec![annotation("d9", "Drug", (0, 1), "C1", "x")];
        assert!(merge_annotations(vec![doc("d1", "")], &unknown, false).is_err());
    }

    #[test]
    fn document_json() {
        let mut d = doc("d1", "café");
        d.annotations.push(AnnotationGroup {
            kind: "Drug".to_string(),
            concept_id: "C1".to_string(),
            gloss: None,
            offsets: vec![(0, 4)],
        });
        let mut out = Vec::new();
        write_documents(&mut out, &[d]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"annotations\": [{\"conceptID\": \"C1\", \"offsets\": [[0, 4]], \"type\": \"Drug\"}], \
             \"content\": \"caf\\u00e9\", \"docID\": \"d1\", \"source\": \"d1.txt\"}\n"
        );
    }

    #[test]
    fn conjoin() {
        let mut annotations = vec![
            annotation("d1", "Drug", (0, 7), "C2", "aspirin"),
            annotation("d2", "Drug", (0, 3), "C9", "asa"),
            annotation("d1", "Drug", (9, 12), "C1", "asa"),
            annotation("d1", "Drug", (14, 17), "C2", "asa"),
        ];
        let stats = conjoin_concepts(&mut annotations, "/");
        assert_eq!(
            stats,
            ConjoinStats {
                documents: 2,
                merged: 1
            }
        );
        let concepts: Vec<&str> = annotations.iter().map(|a| a.concept_id.as_str()).collect();
        assert_eq!(concepts, vec!["C1/C2", "C9", "C1/C2", "C1/C2"]);

        let mut out = Vec::new();
        write_annotations(&mut out, &annotations[1..2]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "d2\tDrug\t0\t3\tC9\tasa\n");
    }
}
