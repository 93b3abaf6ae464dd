use clap::Parser;
use env_logger::Env;
use log::info;

use region_raster::align::{parse_extra_args, reproject_by_template, WarpSettings};
use region_raster::analysis::{
    analyze_masked_area, category_means, load_matched_layers, write_category_means_csv,
    AnalysisSettings, MaskBy,
};
use region_raster::cli::{Args, Command, LayerArgs, RegionArgs};
use region_raster::clip::{clip_regions, clip_to_region};
use region_raster::error::{RegionRasterError, Result};
use region_raster::rasterize::{rasterize_regions, rasterize_shapefile, BatchOutcome};
use region_raster::reader::{read_image, ReadOptions};
use region_raster::render::{export_overlays, manifest_path, validate_clim, LayerSpec};
use region_raster::regions::{RegionDescriptor, RegionTable};
use region_raster::stats::{calculate_statistics, histogram};
use region_raster::tool::OutputMode;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    if let Some(n_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
            .map_err(|e| RegionRasterError::Io(std::io::Error::other(e)))?;
        info!("Using {} threads", n_threads);
    }

    match args.command {
        Command::Reproject {
            input,
            template,
            output,
            resolution,
            resampling,
            use_src_nodata,
            dst_nodata,
            extra,
            output_mode,
        } => {
            let settings = WarpSettings {
                target_res: resolution,
                resampling,
                use_src_nodata,
                dst_nodata,
                extra_args: parse_extra_args(&extra),
                output_mode: OutputMode::from_show_output(output_mode.show_tool_output),
            };
            reproject_by_template(&input, &template, &output, &settings)?;
            info!("Wrote {}", output.display());
        }

        Command::Rasterize {
            input,
            output,
            resolution,
            output_mode,
        } => {
            let mode = OutputMode::from_show_output(output_mode.show_tool_output);
            let size = rasterize_shapefile(&input, &output, resolution, mode)?;
            info!("Wrote {} ({}x{})", output.display(), size.width, size.height);
        }

        Command::RasterizeRegions {
            shapefiles,
            template,
            output_dir,
            resolution,
            output_mode,
        } => {
            let mode = OutputMode::from_show_output(output_mode.show_tool_output);
            let outcomes = rasterize_regions(&shapefiles, &template, &output_dir, resolution, mode)?;
            report_outcomes(&outcomes);
        }

        Command::Clip {
            input,
            cutline,
            output,
            target_crs,
            output_mode,
        } => {
            let mode = OutputMode::from_show_output(output_mode.show_tool_output);
            let outcome = clip_to_region(&input, &cutline, &output, &target_crs, mode)?;
            report_outcomes(&[outcome]);
        }

        Command::ClipRegions {
            input,
            shapefiles,
            output_dir,
            target_crs,
            output_mode,
        } => {
            let mode = OutputMode::from_show_output(output_mode.show_tool_output);
            let outcomes = clip_regions(&input, &shapefiles, &output_dir, &target_crs, mode)?;
            report_outcomes(&outcomes);
        }

        Command::Stats {
            region,
            label,
            exclude,
            bins,
        } => {
            let table = RegionTable::load(&region.regions)?;
            let descriptor = table.get(&region.region)?;
            let image = read_image(&region.rasters_dir, descriptor, &label, &read_options(&region))?;

            let stats = calculate_statistics(&image.array, &exclude);
            println!("{} ({})", label, region.region);
            println!(
                "Mean: {:.2}, Median: {:.2}, 90th Percentile: {:.2}, Min: {:.2}, Max: {:.2}",
                stats.mean, stats.median, stats.percentile_90, stats.min, stats.max
            );

            if let Some(bins) = bins {
                let hist = histogram(&image.array, &exclude, bins);
                for (edge, count) in hist.edges.iter().zip(&hist.counts) {
                    println!("{:>12.2} {}", edge, count);
                }
            }
        }

        Command::Analyze {
            region,
            mask_by,
            mask_below,
            clim,
            layers,
            output_dir,
        } => {
            let table = RegionTable::load(&region.regions)?;
            let descriptor = table.get(&region.region)?;
            let mut settings = analysis_settings(&region, &layers);
            settings.mask_by = mask_by.parse::<MaskBy>()?;
            settings.mask_below = mask_below;
            if let [lo, hi] = clim[..] {
                settings.lst_clim = validate_clim((lo, hi))?;
            }

            let report = analyze_masked_area(
                &region.rasters_dir,
                &region.region,
                descriptor,
                &settings,
                &output_dir,
            )?;

            println!(
                "{}\nMean: {:.2}, Median: {:.2}, 90th Percentile: {:.2}\n",
                settings.imd_layer_name, report.imd.mean, report.imd.median, report.imd.percentile_90
            );
            println!(
                "{}\nMean: {:.2}, Median: {:.2}, 90th Percentile: {:.2}",
                settings.lst_layer_name, report.lst.mean, report.lst.median, report.lst.percentile_90
            );
            info!("Overlay manifest: {}", report.manifest.display());
        }

        Command::Overlay {
            region,
            layers,
            output_dir,
        } => {
            let table = RegionTable::load(&region.regions)?;
            let descriptor = table.get(&region.region)?;
            let specs = layers
                .iter()
                .map(|l| l.parse::<LayerSpec>())
                .collect::<Result<Vec<_>>>()?;

            let manifest = export_overlays(
                &region.rasters_dir,
                &region.region,
                descriptor,
                &specs,
                &read_options(&region),
                &output_dir,
            )?;
            info!(
                "Exported {} layers: {}",
                manifest.layers.len(),
                manifest_path(&output_dir, &region.region).display()
            );
        }

        Command::CategoryMeans {
            region,
            layers,
            keep_outliers,
            exclude,
            output,
        } => {
            let table = RegionTable::load(&region.regions)?;
            let descriptor: &RegionDescriptor = table.get(&region.region)?;
            let settings = analysis_settings(&region, &layers);

            let matched = load_matched_layers(&region.rasters_dir, descriptor, &settings)?;
            let means = category_means(&matched.imd, &matched.lst, !keep_outliers, &exclude)?;
            write_category_means_csv(&output, &means)?;
        }
    }

    info!("=== Done! ===");
    Ok(())
}

fn read_options(region: &RegionArgs) -> ReadOptions {
    ReadOptions {
        projection_marker: region.projection.clone(),
        mask_below: None,
    }
}

fn analysis_settings(region: &RegionArgs, layers: &LayerArgs) -> AnalysisSettings {
    AnalysisSettings {
        imd_label: layers.imd_label.clone(),
        lst_label: layers.lst_label.clone(),
        imd_layer_name: layers.imd_layer_name.clone(),
        lst_layer_name: layers.lst_layer_name.clone(),
        scaling_factor: layers.scaling_factor,
        read: read_options(region),
        ..AnalysisSettings::default()
    }
}

fn report_outcomes(outcomes: &[BatchOutcome]) {
    for outcome in outcomes {
        match outcome {
            BatchOutcome::Written(path) => info!("Written: {}", path.display()),
            BatchOutcome::Skipped(path) => info!("Skipped (exists): {}", path.display()),
        }
    }
}
