pub mod artifact;
pub mod background;
pub mod components;
pub mod contour;
pub mod detector;
pub mod measure;
pub mod morphology;
pub mod preprocess;
pub mod segment;
pub mod threshold;

pub use artifact::{ArtifactRejector, CentroidHistory, RejectorState};
pub use background::{BackgroundModel, BackgroundPhase};
pub use contour::{BoundingBox, Contour, EllipseFit, Point};
pub use detector::{DetectorState, DropletDetector, NoOpObserver, Stage, StageObserver};
pub use measure::{DropletMetrics, Measurer};
pub use preprocess::Preprocessor;
pub use segment::Segmenter;
