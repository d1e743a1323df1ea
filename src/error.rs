pub type SortlastResult<T> = Result<T, SortlastError>;

#[derive(thiserror::Error, Debug)]
pub enum SortlastError {
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("incompatible images: {0}")]
    IncompatibleImages(String),

    #[error("non-partitioning regions: {0}")]
    NonPartitioningRegions(String),

    #[error("collective failure: {0}")]
    CollectiveFailure(String),

    #[error("unsupported group size: {0} ranks")]
    UnsupportedGroupSize(usize),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SortlastError {
    pub fn invalid_region(msg: impl Into<String>) -> Self {
        Self::InvalidRegion(msg.into())
    }

    pub fn incompatible_images(msg: impl Into<String>) -> Self {
        Self::IncompatibleImages(msg.into())
    }

    pub fn non_partitioning(msg: impl Into<String>) -> Self {
        Self::NonPartitioningRegions(msg.into())
    }

    pub fn collective(msg: impl Into<String>) -> Self {
        Self::CollectiveFailure(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }
}
