use crate::coverage::baseline::BaselineSource;
use crate::coverage::convert::{Converter, LineConverter};
use crate::coverage::merge::merge_map;
use crate::coverage::reconcile::{combine, empty_block, file_size, force_line_mode, reconcile};
use crate::coverage::session::{CoverageSession, Instrumenter};
use crate::reporters::RendererRegistry;
use crate::types::errors::Error;
use crate::types::models::{CoverageMap, FileCoverage, RawFileCoverage};
use crate::types::options::{Options, ResolvedOptions};
use crate::utils::pipeline::{CoverageOutput, ReportPipeline};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Turns a coverage session into rendered reports.
///
/// Owns the session, the converter, the renderers and, when reloading is
/// wanted, the source of baseline coverage.
pub struct Engine {
    session: CoverageSession,
    converter: Box<dyn Converter>,
    registry: RendererRegistry,
    baseline: Option<Box<dyn BaselineSource>>,
}

impl Engine {
    pub fn new(session: CoverageSession) -> Self {
        Engine {
            session,
            converter: Box::new(LineConverter),
            registry: RendererRegistry::default(),
            baseline: None,
        }
    }

    /// Engine with a fresh, not yet started session over `instrumenter`
    pub fn with_instrumenter(instrumenter: impl Instrumenter + 'static) -> Self {
        Self::new(CoverageSession::new(instrumenter))
    }

    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn with_registry(mut self, registry: RendererRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_baseline(mut self, baseline: impl BaselineSource + 'static) -> Self {
        self.baseline = Some(Box::new(baseline));
        self
    }

    pub fn start_coverage(&mut self) -> Result<(), Error> {
        self.session.start()
    }

    /// Stop the session and report its coverage according to `options`
    pub fn get_coverage(&mut self, options: &Options) -> Result<CoverageOutput, Error> {
        debug!("get_coverage called with {:?}", options);
        let options = options.resolve()?;
        debug!("Resolved options: {:?}", options);
        self.registry.check(&options.reporters)?;
        if options.reload && self.baseline.is_none() {
            return Err(Error::Config(
                "reload requested but no baseline source is configured".to_string(),
            ));
        }

        let raw = self.session.take()?;
        let (map, raw) = self.build_map(raw, &options)?;
        ReportPipeline::new(&self.registry, &options).run(&map, raw)
    }

    /// Everything between the raw session data and the merged map.
    /// Returns the raw coverage too when the `raw` reporter asked for it.
    fn build_map(
        &self,
        raw: Vec<RawFileCoverage>,
        options: &ResolvedOptions,
    ) -> Result<(CoverageMap, Option<Vec<RawFileCoverage>>), Error> {
        let filter = options.filter();
        let mut observed = combine(filter.select(raw));
        debug!("{} observed files after filtering", observed.len());

        if options.reload {
            if let Some(baseline) = &self.baseline {
                let files: Vec<PathBuf> = observed.iter().map(|f| PathBuf::from(&f.url)).collect();
                let collected = baseline.collect(&files, &options.filter_config())?;
                debug!("Baseline covers {} files", collected.len());
                reconcile(&mut observed, collected);
            }
        }

        let raw_capture = options.wants_raw().then(|| observed.clone());

        let mut seen = HashSet::new();
        let mut reports = Vec::with_capacity(observed.len());
        for mut file in observed {
            let path = PathBuf::from(&file.url);
            if options.force_line_mode {
                force_line_mode(&mut file, file_size(&path)?);
            }
            reports.push(self.converter.convert(&path, &file.functions)?);
            seen.insert(path);
        }

        if options.all {
            for path in filter.project_files() {
                if seen.contains(&path) {
                    continue;
                }
                match self.convert_untested(&path) {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!("Skipping untested file {}: {}", path.display(), e),
                }
            }
        }

        let map = merge_map(CoverageMap::new(), reports)?;
        Ok((map, raw_capture))
    }

    fn convert_untested(&self, path: &Path) -> Result<FileCoverage, Error> {
        let block = empty_block(file_size(path)?);
        self.converter.convert(path, &[block])
    }
}
