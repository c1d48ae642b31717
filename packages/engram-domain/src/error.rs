#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	Validation { message: String },
	#[error("Invalid record kind: {value:?}.")]
	InvalidKind { value: String },
	#[error("Invalid embedding version string: {value:?}.")]
	InvalidVersion { value: String },
}
