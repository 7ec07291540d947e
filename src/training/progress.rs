use std::{fs, io, path::Path};

use image::{math::Rect, ImageBuffer, Rgb, RgbImage};
#[cfg(feature = "plots")]
use log::warn;
use serde::{Deserialize, Serialize};

use super::{Result, TrainError};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 400;
const MARGIN: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub round: usize,
    pub win_rate: f32,
}

/// Win rate against the fixed baseline, per evaluated round. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressCurve {
    points: Vec<CurvePoint>,
}

impl ProgressCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, round: usize, win_rate: f32) {
        self.points.push(CurvePoint { round, win_rate });
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn latest(&self) -> Option<CurvePoint> {
        self.points.last().copied()
    }

    /// Writes the plot to `path` and the raw points next to it as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TrainError::io(parent, e))?;
        }
        self.plot()
            .save(path)
            .map_err(|e| TrainError::io(path, io::Error::other(e)))?;

        let json_path = path.with_extension("json");
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| TrainError::io(&json_path, io::Error::other(e)))?;
        fs::write(&json_path, json).map_err(|e| TrainError::io(&json_path, e))
    }

    #[cfg(not(feature = "plots"))]
    fn plot(&self) -> RgbImage {
        self.render()
    }

    #[cfg(feature = "plots")]
    fn plot(&self) -> RgbImage {
        self.render_chart().unwrap_or_else(|e| {
            warn!("Drawing the labelled chart failed ({e}), saving the plain plot");
            self.render()
        })
    }

    /// Captioned chart with labelled axes.
    #[cfg(feature = "plots")]
    pub fn render_chart(&self) -> Result<RgbImage, Box<dyn std::error::Error>> {
        use plotters::prelude::*;

        let mut buf = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buf, (WIDTH, HEIGHT)).into_drawing_area();
            root.fill(&WHITE)?;
            let last_round = self.points.iter().map(|p| p.round).max().unwrap_or(0).max(1);
            let mut chart = ChartBuilder::on(&root)
                .margin(20)
                .caption("Win rate against baseline", ("sans-serif", 22))
                .x_label_area_size(40)
                .y_label_area_size(50)
                .build_cartesian_2d(0..last_round, 0f32..1f32)?;
            chart
                .configure_mesh()
                .x_desc("round")
                .y_desc("win rate")
                .y_labels(5)
                .draw()?;
            chart.draw_series(LineSeries::new(
                self.points.iter().map(|p| (p.round, p.win_rate)),
                &BLUE,
            ))?;
            chart.draw_series(
                self.points
                    .iter()
                    .map(|p| Circle::new((p.round, p.win_rate), 3, RED.filled())),
            )?;
            root.present()?;
        }
        RgbImage::from_raw(WIDTH, HEIGHT, buf).ok_or_else(|| "chart buffer has the wrong size".into())
    }

    /// Axes, quarter grid lines, polyline and point markers, no text.
    pub fn render(&self) -> RgbImage {
        let mut img = RgbImage::new(WIDTH, HEIGHT);
        let plot = Rect {
            x: MARGIN,
            y: MARGIN / 2,
            width: WIDTH - MARGIN * 3 / 2,
            height: HEIGHT - MARGIN * 3 / 2,
        };
        draw_rect(
            &mut img,
            Rect {
                x: 0,
                y: 0,
                width: WIDTH,
                height: HEIGHT,
            },
            Rgb([255, 255, 255]),
        );

        for step in 0..=4 {
            let y = to_pixel_y(&plot, step as f32 / 4.0);
            draw_rect(
                &mut img,
                Rect {
                    x: plot.x,
                    y,
                    width: plot.width,
                    height: 1,
                },
                Rgb([220, 220, 220]),
            );
        }
        // axes
        draw_rect(
            &mut img,
            Rect {
                x: plot.x,
                y: plot.y,
                width: 2,
                height: plot.height + 1,
            },
            Rgb([0, 0, 0]),
        );
        draw_rect(
            &mut img,
            Rect {
                x: plot.x,
                y: plot.y + plot.height,
                width: plot.width,
                height: 2,
            },
            Rgb([0, 0, 0]),
        );

        let last_round = self.points.iter().map(|p| p.round).max().unwrap_or(0).max(1);
        let pixels: Vec<(u32, u32)> = self
            .points
            .iter()
            .map(|p| {
                let x = plot.x + (p.round as f32 / last_round as f32 * plot.width as f32) as u32;
                (x.min(plot.x + plot.width - 1), to_pixel_y(&plot, p.win_rate))
            })
            .collect();

        for pair in pixels.windows(2) {
            draw_line(&mut img, pair[0], pair[1], Rgb([40, 90, 200]));
        }
        for &(x, y) in &pixels {
            draw_rect(
                &mut img,
                Rect {
                    x: x.saturating_sub(2),
                    y: y.saturating_sub(2),
                    width: 5,
                    height: 5,
                },
                Rgb([200, 30, 30]),
            );
        }

        img
    }
}

fn to_pixel_y(plot: &Rect, win_rate: f32) -> u32 {
    let rate = win_rate.clamp(0.0, 1.0);
    plot.y + ((1.0 - rate) * plot.height as f32) as u32
}

fn draw_rect(img: &mut ImageBuffer<Rgb<u8>, Vec<u8>>, r: Rect, pixel: Rgb<u8>) {
    for i in r.x..(r.x + r.width).min(img.width()) {
        for j in r.y..(r.y + r.height).min(img.height()) {
            img.put_pixel(i, j, pixel);
        }
    }
}

fn draw_line(img: &mut ImageBuffer<Rgb<u8>, Vec<u8>>, from: (u32, u32), to: (u32, u32), pixel: Rgb<u8>) {
    let (x0, y0) = (from.0 as f32, from.1 as f32);
    let (x1, y1) = (to.0 as f32, to.1 as f32);
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as u32;
    for s in 0..=steps {
        let t = s as f32 / steps as f32;
        let x = (x0 + (x1 - x0) * t).round() as u32;
        let y = (y0 + (y1 - y0) * t).round() as u32;
        if x < img.width() && y < img.height() {
            img.put_pixel(x, y, pixel);
        }
    }
}
