use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Invalid device specification string.
    #[snafu(display("invalid device: {device}"))]
    InvalidDevice { device: String },

    /// No factory registered for the requested device type.
    #[snafu(display("unsupported device type: {device}"))]
    UnsupportedDevice { device: String },

    /// Device memory allocation failed.
    #[snafu(display("allocation of {size} bytes failed on {allocator}"))]
    Allocation { size: usize, allocator: String },

    /// Buffer or image created with a zero byte size.
    #[snafu(display("invalid buffer size: {size}"))]
    InvalidBufferSize { size: usize },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Image layout with inconsistent dimensions or pitches.
    #[snafu(display("invalid image layout: {reason}"))]
    InvalidImageLayout { reason: String },

    /// Memory object has no resident allocation for the device instance.
    #[snafu(display("memory object not resident on device instance {instance}"))]
    NotResident { instance: usize },

    /// Image handle requested from a plain buffer object.
    #[snafu(display("memory object is not an image"))]
    NotAnImage,

    /// The submission ring has no free slot.
    #[snafu(display("submission ring is full (capacity {capacity})"))]
    RingFull { capacity: usize },

    /// A completion signal did not drop below the threshold in time.
    #[snafu(display(
        "signal wait timed out after {timeout_ms}ms (waiting for value < {threshold}, current {current})"
    ))]
    SignalTimeout { timeout_ms: u64, threshold: i64, current: i64 },
}
