//! Remote file classification
//!
//! A file's category is decided by which top-level put.io folder it sits in.

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::services::putio::{PutioFile, RemoteStorage};
use crate::transfer::{Category, FileId};

/// Determine which monitored category a remote file belongs to.
///
/// The file lookup and both folder searches are issued concurrently. Movies is
/// checked before TV; anything else is `Other`.
pub async fn classify(remote: &dyn RemoteStorage, file_id: FileId) -> Result<Category> {
    let (file, movies, tv) = tokio::try_join!(
        remote.get_file(file_id),
        remote.search(Category::Movies.as_str()),
        remote.search(Category::Tv.as_str()),
    )
    .map_err(|e| PipelineError::classifier(file_id, format!("{:#}", e)))?;

    let movies_id = folder_id(&movies, Category::Movies.as_str());
    let tv_id = folder_id(&tv, Category::Tv.as_str());

    let category = match file.parent_id {
        Some(parent) if Some(parent) == movies_id => Category::Movies,
        Some(parent) if Some(parent) == tv_id => Category::Tv,
        _ => Category::Other,
    };

    debug!(
        file_id,
        parent_id = ?file.parent_id,
        movies_id = ?movies_id,
        tv_id = ?tv_id,
        category = %category,
        "Classified remote file"
    );

    Ok(category)
}

/// Pick the folder id for a name from search results: an exact (case-insensitive)
/// name match wins, otherwise the first hit.
fn folder_id(results: &[PutioFile], name: &str) -> Option<FileId> {
    results
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .or_else(|| results.first())
        .map(|f| f.id)
}
