//! Configuration loading and the main tick loop.

use crate::Args;
use ssp_capture::TcpFrameSource;
use ssp_data::LookupTable;
use ssp_gpu::{GpuContext, GpuDepthProjector};
use ssp_pipeline::{
    ConfigError, CpuDepthProjector, FramePipeline, KernelError, PipelineConfig, PipelineStats,
    PointCloud, ProjectionKernel,
};
use std::error::Error;
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<PipelineConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.host_port = port;
    }
    if let Some(lut) = &args.lut {
        config.lut_name = lut.clone();
    }
    config.validate()?;
    Ok(config)
}

pub fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    info!(
        endpoint = %config.endpoint(),
        lut = %config.lut_path().display(),
        gpu = args.gpu,
        "Starting ssp-client"
    );

    let (stats, position_updates, color_updates, valid_points) = if args.gpu {
        let ctx = pollster::block_on(GpuContext::new("ssp_client"))?;
        let (cloud, stats) = run_pipeline(&args, &config, |table| {
            Ok(GpuDepthProjector::new(&ctx, &table)?)
        })?;
        let valid_points = match cloud.positions() {
            Some(map) => map.read_back(&ctx)?.valid_count(),
            None => 0,
        };
        (
            stats,
            cloud.position_revision(),
            cloud.color_revision(),
            valid_points,
        )
    } else {
        let (cloud, stats) =
            run_pipeline(&args, &config, |table| Ok(CpuDepthProjector::new(table)))?;
        (
            stats,
            cloud.position_revision(),
            cloud.color_revision(),
            cloud.points().len(),
        )
    };

    info!(
        ticks = stats.ticks,
        empty_polls = stats.empty_polls,
        depth_updates = position_updates,
        color_updates,
        depth_abandoned = stats.depth_abandoned,
        color_abandoned = stats.color_abandoned,
        valid_points,
        "Session summary"
    );
    Ok(())
}

fn run_pipeline<K, F>(
    args: &Args,
    config: &PipelineConfig,
    make_kernel: F,
) -> Result<(PointCloud<K::Output>, PipelineStats), Box<dyn Error>>
where
    K: ProjectionKernel,
    F: FnOnce(LookupTable) -> Result<K, KernelError>,
{
    let mut pipeline: FramePipeline<TcpFrameSource, K, PointCloud<K::Output>> =
        FramePipeline::from_config(config, PointCloud::new(config.pose()));
    pipeline.init_from_path(config.lut_path(), make_kernel)?;

    let endpoint = config.endpoint();
    pipeline.start(|| TcpFrameSource::connect(&endpoint))?;

    let interval = Duration::from_millis(args.tick_interval_ms);
    let mut ticks = 0u64;
    while args.ticks == 0 || ticks < args.ticks {
        // One last tick drains a frame that arrived just before the stream ended.
        let ended = pipeline.source().is_some_and(|source| !source.is_receiving());
        pipeline.tick();
        ticks += 1;
        if ended {
            info!("Stream ended");
            break;
        }
        thread::sleep(interval);
    }

    pipeline.shutdown()?;
    let stats = pipeline.stats();
    Ok((pipeline.into_sink(), stats))
}
