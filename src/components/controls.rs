use eframe::egui;

use crate::layers::{Control, LayerParams};
use crate::session::{ControlError, ControlRead};

// ============================================================================
// CONTROL PANEL - ten sliders for the active layer
// ============================================================================

/// Slider state for the active layer.
///
/// Values are only reported once the panel has been drawn after a reset;
/// until then every read is `NotRealized` and the session keeps its own
/// parameters.
pub struct ControlPanel {
    values: [u8; 10],
    realized: bool,
}

impl ControlPanel {
    pub fn new(params: &LayerParams) -> Self {
        let mut panel = Self {
            values: [0; 10],
            realized: false,
        };
        panel.reset(params);
        panel
    }

    /// Load a layer's values; the panel must be shown again before reads succeed.
    pub fn reset(&mut self, params: &LayerParams) {
        for (slot, control) in self.values.iter_mut().zip(Control::ALL) {
            *slot = params.get(control);
        }
        self.realized = false;
    }

    pub fn is_realized(&self) -> bool {
        self.realized
    }

    pub fn value(&self, control: Control) -> u8 {
        self.values[Self::slot(control)]
    }

    /// Current reading of every control.
    pub fn read(&self) -> Vec<(Control, ControlRead)> {
        Control::ALL
            .into_iter()
            .map(|c| {
                let read = if self.realized {
                    Ok(self.value(c) as i32)
                } else {
                    Err(ControlError::NotRealized(c))
                };
                (c, read)
            })
            .collect()
    }

    /// Draw the sliders two per row (min / max). Returns `true` if any value changed.
    pub fn show(&mut self, ui: &mut egui::Ui) -> bool {
        let mut changed = false;
        egui::Grid::new("hsv_controls")
            .num_columns(4)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                for pair in Control::ALL.chunks_exact(2) {
                    for &control in pair {
                        ui.label(control.key());
                        let slot = Self::slot(control);
                        let slider = egui::Slider::new(&mut self.values[slot], 0..=control.domain_max());
                        changed |= ui.add(slider).changed();
                    }
                    ui.end_row();
                }
            });
        self.realized = true;
        changed
    }

    fn slot(control: Control) -> usize {
        Control::ALL.iter().position(|&c| c == control).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerSet;

    #[test]
    fn unrealized_panel_reports_not_realized() {
        let set = LayerSet::tuner();
        let panel = ControlPanel::new(&set.layers[0].params);
        assert!(!panel.is_realized());
        let reads = panel.read();
        assert_eq!(reads.len(), 10);
        assert_eq!(reads[0], (Control::HMin, Err(ControlError::NotRealized(Control::HMin))));
    }

    #[test]
    fn reset_loads_layer_values() {
        let set = LayerSet::tuner();
        let mut panel = ControlPanel::new(&set.layers[0].params);
        panel.reset(&set.layers[1].params);
        assert_eq!(panel.value(Control::HMin), 18);
        assert_eq!(panel.value(Control::XMax), 56);
    }
}
