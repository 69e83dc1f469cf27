/// Identifies the block a write stream is targeting.
///
/// Everything here comes from the namenode's block allocation; the stream
/// itself only consumes the block id (for diagnostics) and the pipeline
/// length (to interpret ack replies).
#[derive(Clone, Debug)]
pub struct BlockDescriptor {
    /// Numeric block id within the pool
    pub block_id: u64,

    /// Generation stamp of the block
    pub generation_stamp: u64,

    /// Block pool the block belongs to
    pub pool_id: String,

    /// Datanode transfer addresses, in pipeline order. The stream is
    /// connected to the first; it forwards to the rest.
    pub pipeline: Vec<String>,
}

impl BlockDescriptor {
    pub fn new(
        block_id: u64,
        generation_stamp: u64,
        pool_id: impl Into<String>,
        pipeline: Vec<String>,
    ) -> Self {
        Self {
            block_id,
            generation_stamp,
            pool_id: pool_id.into(),
            pipeline,
        }
    }

    /// Number of replicas in the pipeline, which is also the number of
    /// status entries expected in each ack.
    pub fn pipeline_len(&self) -> usize {
        self.pipeline.len()
    }
}
