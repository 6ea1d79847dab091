// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::BossError;

/// Minimum number of training instances a classifier accepts.
pub const MIN_TRAIN_INSTANCES: usize = 2;

/// One (possibly multivariate) series with an optional class label.
///
/// All channels share one length. Unlabeled instances are the query type for
/// prediction.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    channels: Vec<Vec<f64>>,
    label: Option<usize>,
}

impl Instance {
    /// Constructs a validated instance.
    pub fn new(channels: Vec<Vec<f64>>, label: Option<usize>) -> Result<Self, BossError> {
        if channels.is_empty() {
            return Err(BossError::invalid_input(
                "instance must contain at least one channel",
            ));
        }

        let series_len = channels[0].len();
        if series_len == 0 {
            return Err(BossError::invalid_input("instance channels must be non-empty"));
        }

        for (channel_idx, channel) in channels.iter().enumerate() {
            if channel.len() != series_len {
                return Err(BossError::invalid_input(format!(
                    "ragged instance: channel {channel_idx} has length {}, expected {series_len}",
                    channel.len()
                )));
            }
            if let Some((idx, value)) = channel
                .iter()
                .copied()
                .enumerate()
                .find(|(_, v)| !v.is_finite())
            {
                return Err(BossError::invalid_input(format!(
                    "instance values must be finite: channel {channel_idx}, index {idx} has {value}"
                )));
            }
        }

        Ok(Self { channels, label })
    }

    /// Convenience constructor for a single-channel series.
    pub fn univariate(values: Vec<f64>, label: Option<usize>) -> Result<Self, BossError> {
        Self::new(vec![values], label)
    }

    /// Convenience constructor for a query instance.
    pub fn unlabeled(channels: Vec<Vec<f64>>) -> Result<Self, BossError> {
        Self::new(channels, None)
    }

    pub fn channel(&self, index: usize) -> &[f64] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn series_len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn label(&self) -> Option<usize> {
        self.label
    }

    /// Returns a copy of this instance with the label removed.
    pub fn without_label(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            label: None,
        }
    }
}

/// Validated labeled training set.
///
/// Every instance carries a label in `[0, num_classes)` and the same channel
/// count and series length.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    instances: Vec<Instance>,
    num_classes: usize,
}

impl Dataset {
    pub fn new(instances: Vec<Instance>, num_classes: usize) -> Result<Self, BossError> {
        if num_classes < 2 {
            return Err(BossError::invalid_input(format!(
                "nominal class with at least 2 values required; got num_classes={num_classes}"
            )));
        }
        if instances.len() < MIN_TRAIN_INSTANCES {
            return Err(BossError::invalid_input(format!(
                "at least {MIN_TRAIN_INSTANCES} instances required; got {}",
                instances.len()
            )));
        }

        let n_channels = instances[0].n_channels();
        let series_len = instances[0].series_len();
        for (idx, instance) in instances.iter().enumerate() {
            if instance.n_channels() != n_channels || instance.series_len() != series_len {
                return Err(BossError::invalid_input(format!(
                    "instance {idx} has shape {}x{}, expected {n_channels}x{series_len}",
                    instance.n_channels(),
                    instance.series_len()
                )));
            }
            match instance.label() {
                None => {
                    return Err(BossError::invalid_input(format!(
                        "training instance {idx} is missing a class label"
                    )));
                }
                Some(label) if label >= num_classes => {
                    return Err(BossError::invalid_input(format!(
                        "training instance {idx} has label {label}, expected < {num_classes}"
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            instances,
            num_classes,
        })
    }

    /// Builds a univariate dataset from tabular rows whose class value is
    /// stored in the last attribute.
    pub fn from_rows(
        rows: &[Vec<f64>],
        class_index: usize,
        num_classes: usize,
    ) -> Result<Self, BossError> {
        let Some(first) = rows.first() else {
            return Err(BossError::invalid_input("dataset must contain rows"));
        };
        let n_attributes = first.len();
        if n_attributes < 2 {
            return Err(BossError::invalid_input(format!(
                "rows need at least one series value and a class value; got {n_attributes} attributes"
            )));
        }
        if class_index != n_attributes - 1 {
            return Err(BossError::invalid_input(format!(
                "class attribute must be the last attribute: class_index={class_index}, n_attributes={n_attributes}"
            )));
        }

        let mut instances = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != n_attributes {
                return Err(BossError::invalid_input(format!(
                    "row {row_idx} has {} attributes, expected {n_attributes}",
                    row.len()
                )));
            }
            let raw_label = row[class_index];
            if !raw_label.is_finite() || raw_label < 0.0 || raw_label.fract() != 0.0 {
                return Err(BossError::invalid_input(format!(
                    "row {row_idx} class value must be a non-negative integer; got {raw_label}"
                )));
            }
            instances.push(Instance::univariate(
                row[..class_index].to_vec(),
                Some(raw_label as usize),
            )?);
        }

        Self::new(instances, num_classes)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn n_channels(&self) -> usize {
        self.instances[0].n_channels()
    }

    pub fn series_len(&self) -> usize {
        self.instances[0].series_len()
    }

    pub fn is_multivariate(&self) -> bool {
        self.n_channels() > 1
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance(&self, index: usize) -> &Instance {
        &self.instances[index]
    }

    /// Class labels in instance order.
    pub fn labels(&self) -> Vec<usize> {
        self.instances
            .iter()
            .map(|instance| instance.label().unwrap_or_default())
            .collect()
    }

    /// Borrowed view of one channel across all instances.
    pub fn channel_series(&self, channel: usize) -> Vec<&[f64]> {
        self.instances
            .iter()
            .map(|instance| instance.channel(channel))
            .collect()
    }

    /// Number of instances per class label.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for instance in &self.instances {
            if let Some(label) = instance.label() {
                counts[label] += 1;
            }
        }
        counts
    }

    /// Verifies a query instance matches the training shape.
    pub fn check_query(&self, query: &Instance) -> Result<(), BossError> {
        check_query_shape(query, self.n_channels(), self.series_len())
    }
}

/// Verifies a query instance has `n_channels` channels of `series_len` values.
pub fn check_query_shape(
    query: &Instance,
    n_channels: usize,
    series_len: usize,
) -> Result<(), BossError> {
    if query.n_channels() != n_channels || query.series_len() != series_len {
        return Err(BossError::invalid_input(format!(
            "query shape {}x{} does not match training shape {n_channels}x{series_len}",
            query.n_channels(),
            query.series_len()
        )));
    }
    Ok(())
}
