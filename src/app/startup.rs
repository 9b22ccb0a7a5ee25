use tracing::info;

use crate::analysis::MotionAnalyzer;
use crate::config::PosecamConfig;
use crate::error::Result;
use crate::export::ExportCoordinator;
use crate::session::SessionPipeline;
use crate::source::DefaultSourceOpener;

/// Assemble the pipeline used by the binary: default source opener,
/// motion analyzer and export coordinator, all from configuration
pub fn build_pipeline(config: &PosecamConfig) -> Result<SessionPipeline> {
    let opener = DefaultSourceOpener::new(config.camera.clone(), config.session.cadence_fps);
    let analyzer = MotionAnalyzer::new(config.analyzer.clone());
    let exporter = ExportCoordinator::from_config(config)?;

    info!(
        "Pipeline ready: {} fps cadence, {} export to {}",
        config.session.cadence_fps,
        config.export.video_format.extension(),
        exporter.output_dir().display()
    );

    Ok(SessionPipeline::new(
        config.session.clone(),
        Box::new(opener),
        Box::new(analyzer),
        Box::new(exporter),
    ))
}
