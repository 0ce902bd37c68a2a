//! Stream setup applied to the client right after it connects.

use serde::Deserialize;

use crate::error::{Result, StreamError};

/// How the client obtains frames from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Request a frame on each call and block until it arrives.
    ClientPull,
    /// Like `ClientPull`, but the next frame is fetched ahead of the call.
    ClientPullPreFetch,
    /// The server sends every frame as soon as it is captured.
    #[default]
    ServerPush,
}

/// World direction a client axis points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisDirection {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

impl AxisDirection {
    /// 0 for forward/backward, 1 for left/right, 2 for up/down.
    fn line(self) -> usize {
        match self {
            Self::Forward | Self::Backward => 0,
            Self::Left | Self::Right => 1,
            Self::Up | Self::Down => 2,
        }
    }
}

/// Direction of the client's x, y and z axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AxisMapping {
    pub x: AxisDirection,
    pub y: AxisDirection,
    pub z: AxisDirection,
}

impl AxisMapping {
    /// Check that the three axes lie on distinct lines.
    ///
    /// Handedness is left to the server.
    pub fn validate(&self) -> Result<()> {
        let (x, y, z) = (self.x.line(), self.y.line(), self.z.line());
        if x == y || y == z || x == z {
            return Err(StreamError::Validation(format!(
                "axis mapping {:?} reuses a direction",
                self
            )));
        }
        Ok(())
    }
}

impl Default for AxisMapping {
    /// x forward, y left, z up.
    fn default() -> Self {
        Self {
            x: AxisDirection::Forward,
            y: AxisDirection::Left,
            z: AxisDirection::Up,
        }
    }
}

/// Everything configured on the stream once connected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub mode: StreamMode,

    /// Frames the client buffers. 1 keeps the client on the latest frame.
    pub buffer_size: usize,

    pub axis_mapping: AxisMapping,
}

impl StreamSettings {
    /// Check the buffer size and the axis mapping.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(StreamError::Validation(
                "stream buffer size must be at least 1".to_string(),
            ));
        }
        self.axis_mapping.validate()
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            mode: StreamMode::ServerPush,
            buffer_size: 1,
            axis_mapping: AxisMapping::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_keep_latest_frame() {
        let settings = StreamSettings::default();

        assert_eq!(settings.mode, StreamMode::ServerPush);
        assert_eq!(settings.buffer_size, 1);
        assert_eq!(
            settings.axis_mapping,
            AxisMapping {
                x: AxisDirection::Forward,
                y: AxisDirection::Left,
                z: AxisDirection::Up,
            }
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let empty_buffer = StreamSettings {
            buffer_size: 0,
            ..StreamSettings::default()
        };
        let collinear = StreamSettings {
            axis_mapping: AxisMapping {
                x: AxisDirection::Forward,
                y: AxisDirection::Backward,
                z: AxisDirection::Up,
            },
            ..StreamSettings::default()
        };

        assert!(matches!(empty_buffer.validate(), Err(StreamError::Validation(_))));
        assert!(matches!(collinear.validate(), Err(StreamError::Validation(_))));
    }

    #[test]
    fn test_settings_from_yaml() {
        let settings: StreamSettings = serde_yaml::from_str(
            "mode: client_pull_pre_fetch\naxis_mapping: {x: right, y: forward, z: up}\n",
        )
        .unwrap();

        assert_eq!(settings.mode, StreamMode::ClientPullPreFetch);
        assert_eq!(settings.buffer_size, 1);
        assert_eq!(settings.axis_mapping.x, AxisDirection::Right);
        assert!(settings.validate().is_ok());
    }
}
