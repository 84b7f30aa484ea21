use crate::directory::{Extent, OffsetDirectory};
use crate::error::{IndexError, Result};
use crate::index::DocMapping;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, remove_file, rename, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u64,
    pub partial_segments: u32,
    pub chunk_size: u64,
    pub created_at: String,
    pub version: u32,
}

/// File layout of one index directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn segments_dir(&self) -> PathBuf { self.root.join("segments") }
    pub fn partial_segment(&self, seq: u32) -> PathBuf {
        self.segments_dir().join(format!("segment_{seq:06}.seg"))
    }
    pub fn postings(&self) -> PathBuf { self.root.join("postings.seg") }
    pub fn directory(&self) -> PathBuf { self.root.join("directory.bin") }
    pub fn doc_mapping(&self) -> PathBuf { self.root.join("doc_mapping.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    /// Bytes on disk of the files a query engine needs.
    pub fn size_on_disk(&self) -> Result<u64> {
        let mut total = 0;
        for p in [self.postings(), self.directory(), self.doc_mapping(), self.meta()] {
            total += std::fs::metadata(&p)?.len();
        }
        Ok(total)
    }
}

pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn open_existing(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IndexError::MissingIndexFile(path.to_path_buf()),
        _ => IndexError::Io(e),
    })
}

pub fn save_directory_to(path: &Path, directory: &OffsetDirectory) -> Result<()> {
    let entries = directory.sorted_entries();
    let mut f = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut f, &entries)?;
    let f = f.into_inner().map_err(|e| IndexError::Io(e.into_error()))?;
    f.sync_all()?;
    Ok(())
}

pub fn load_directory(paths: &IndexPaths) -> Result<OffsetDirectory> {
    let f = BufReader::new(open_existing(&paths.directory())?);
    let entries: Vec<(String, Extent)> = bincode::deserialize_from(f)?;
    Ok(OffsetDirectory::from_entries(entries))
}

pub fn save_doc_mapping_to(path: &Path, mapping: &DocMapping) -> Result<()> {
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(mapping.urls())?;
    f.write_all(&bytes)?;
    f.sync_all()?;
    Ok(())
}

pub fn load_doc_mapping(paths: &IndexPaths) -> Result<DocMapping> {
    let mut f = open_existing(&paths.doc_mapping())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let urls: Vec<String> = bincode::deserialize(&buf)?;
    Ok(DocMapping::from_urls(urls))
}

/// Written through a temp file so a reader never sees a partial `meta.json`.
pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let tmp = temp_path(&paths.meta());
    let json = serde_json::to_string_pretty(meta)?;
    let written = File::create(&tmp).and_then(|mut f| {
        f.write_all(json.as_bytes())?;
        f.sync_all()
    });
    if let Err(e) = written.and_then(|_| rename(&tmp, paths.meta())) {
        let _ = remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Drop `meta.json`. Without it the directory cannot be opened as an index.
pub fn remove_meta(paths: &IndexPaths) -> Result<()> {
    match remove_file(paths.meta()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = open_existing(&paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}
