use bson::Document;
use shale_query::{Filter, Stage, Update, parse_filter, parse_pipeline, parse_update};

use crate::error::DbError;

/// Trait for types that can be turned into a [`Filter`].
///
/// Implemented for [`Filter`] itself and for filter documents, which are
/// parsed with [`parse_filter`].
pub trait IntoFilter {
    fn into_filter(self) -> Result<Filter, DbError>;
}

impl IntoFilter for Filter {
    fn into_filter(self) -> Result<Filter, DbError> {
        Ok(self)
    }
}

impl IntoFilter for Document {
    fn into_filter(self) -> Result<Filter, DbError> {
        Ok(parse_filter(&self)?)
    }
}

impl IntoFilter for &Document {
    fn into_filter(self) -> Result<Filter, DbError> {
        Ok(parse_filter(self)?)
    }
}

/// Trait for types that can be turned into an [`Update`].
pub trait IntoUpdate {
    fn into_update(self) -> Result<Update, DbError>;
}

impl IntoUpdate for Update {
    fn into_update(self) -> Result<Update, DbError> {
        Ok(self)
    }
}

impl IntoUpdate for Document {
    fn into_update(self) -> Result<Update, DbError> {
        Ok(parse_update(&self)?)
    }
}

impl IntoUpdate for &Document {
    fn into_update(self) -> Result<Update, DbError> {
        Ok(parse_update(self)?)
    }
}

/// Trait for types that can be turned into aggregation [`Stage`]s.
pub trait IntoPipeline {
    fn into_pipeline(self) -> Result<Vec<Stage>, DbError>;
}

impl IntoPipeline for Vec<Stage> {
    fn into_pipeline(self) -> Result<Vec<Stage>, DbError> {
        Ok(self)
    }
}

impl IntoPipeline for Vec<Document> {
    fn into_pipeline(self) -> Result<Vec<Stage>, DbError> {
        Ok(parse_pipeline(&self)?)
    }
}

impl IntoPipeline for &[Document] {
    fn into_pipeline(self) -> Result<Vec<Stage>, DbError> {
        Ok(parse_pipeline(self)?)
    }
}
