//! Plot out the self tuning process trimming a simulated oscillator
//!
//! Look in /images/ for the resulting plot.
//!
//! Requires plotters lib: https://docs.rs/plotters/latest/plotters/. Tested on an Ubuntu machine.

use std::cell::Cell;

use mcu_vco::{
    hardware::{CvOutputs, DacChannel},
    period_meter::{MeterEvent, MeterLink},
    tuning::{Calibration, Pass, Tuner, TunerEvent, TuningConfig, TuningStrategy, TwoPoint, UnitStep},
};
use plotters::prelude::*;

/// An ideal oscillator with no slew, perfectly trimmed at offset 2150 and scale 1950
#[derive(Default)]
struct MockVco {
    cv: Cell<u16>,
    scale: Cell<u16>,
    offset: Cell<u16>,
    pending: Cell<u8>,
}

impl MockVco {
    fn period_count(&self) -> u16 {
        let octaves = self.cv.get() as f32 * 10.0 / 4095.0;
        let exponent =
            (self.offset.get() as f32 - 2150.0) / 400.0 + octaves * 1950.0 / (self.scale.get() as f32).max(1.0);
        let freq = 8.0 * 2.0_f32.powf(exponent);
        (250_000.0 / freq).min(u16::MAX as f32) as u16
    }
}

impl CvOutputs for &MockVco {
    fn write_dac(&mut self, channel: DacChannel, code: u16) {
        match channel {
            DacChannel::Cv => self.cv.set(code),
            DacChannel::ExpScale => self.scale.set(code),
            DacChannel::ExpOffset => self.offset.set(code),
        }
    }

    fn set_hard_sync(&mut self, _asserted: bool) {}
}

impl MeterLink for &MockVco {
    fn arm(&mut self) {
        self.pending.set(2);
    }

    fn poll_event(&mut self) -> Option<MeterEvent> {
        match self.pending.get() {
            2 => {
                self.pending.set(1);
                Some(MeterEvent::Settled)
            }
            1 => {
                self.pending.set(0);
                Some(MeterEvent::Captured(self.period_count()))
            }
            _ => None,
        }
    }
}

/// `trace(s)` is the measured period over the target period for every measurement while tuning with strategy `s`
fn trace<S: TuningStrategy>(strategy: S) -> Result<Vec<(Pass, f32)>, Box<dyn std::error::Error>> {
    let config = TuningConfig::default();
    let vco = MockVco::default();
    let mut tuner = Tuner::new(config, strategy, Calibration::from(&config))?;

    let (mut out, mut link) = (&vco, &vco);
    let mut points = vec![];

    while !tuner.is_finished() {
        if let TunerEvent::Captured { count } = tuner.service(&mut out, &mut link)? {
            points.push((tuner.pass(), count as f32 / tuner.plan().target as f32));
        }
    }

    println!("{:?}", tuner.calibration());

    Ok(points)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let unit_step = trace(UnitStep)?;
    let two_point = trace(TwoPoint::default())?;

    std::fs::create_dir_all("images")?;
    let root = BitMapBackend::new("images/tuning_example_plot_0.png", (640, 480)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_len = unit_step.len().max(two_point.len());

    let mut chart = ChartBuilder::on(&root)
        .caption("Self Tuning", ("Arial", 20).into_font())
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(0f32..max_len as f32, 0f32..2f32)?;

    chart
        .configure_mesh()
        .x_desc("Measurement")
        .y_desc("Period / target")
        .draw()?;

    // plot out the plain search, the offset pass then the scale pass
    chart
        .draw_series(LineSeries::new(
            unit_step.iter().enumerate().map(|(i, (_, r))| (i as f32, *r)),
            BLUE,
        ))?
        .label("Unit step")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    // plot out the interpolating search
    chart
        .draw_series(LineSeries::new(
            two_point.iter().enumerate().map(|(i, (_, r))| (i as f32, *r)),
            RED,
        ))?
        .label("Two point")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    // mark where each search moved on to the scale pass
    for (points, color) in [(&unit_step, BLUE), (&two_point, RED)] {
        if let Some(i) = points.iter().position(|(p, _)| *p == Pass::Scale) {
            chart.draw_series(std::iter::once(Circle::new((i as f32, points[i].1), 4, color.filled())))?;
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;

    Ok(())
}
