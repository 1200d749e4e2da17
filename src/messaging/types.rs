use crate::core::mode::OperatingMode;
use crate::core::pitch::{EstimateResult, Generation};

/// Messages processed, in order, by the controller thread
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    SelectMode(OperatingMode),
    SelectDevice(String),
    ListDevices,
    ListMidiPorts,
    Status,
    Estimate { generation: Generation, result: EstimateResult },
    Quit,
}

impl ControlMessage {
    /// Parse one line typed on the control surface
    pub fn parse_command(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };
        let message = match command {
            "device" if !argument.is_empty() => ControlMessage::SelectDevice(argument.to_string()),
            "device" | "devices" => ControlMessage::ListDevices,
            "ports" => ControlMessage::ListMidiPorts,
            "status" => ControlMessage::Status,
            "quit" | "exit" => ControlMessage::Quit,
            selection => ControlMessage::SelectMode(OperatingMode::from_selection(selection)),
        };
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_surface_commands() {
        assert_eq!(ControlMessage::parse_command("audio"), Some(ControlMessage::SelectMode(OperatingMode::Mono)));
        assert_eq!(ControlMessage::parse_command(" midi "), Some(ControlMessage::SelectMode(OperatingMode::Midi)));
        assert_eq!(ControlMessage::parse_command("off"), Some(ControlMessage::SelectMode(OperatingMode::Mute)));
        assert_eq!(
            ControlMessage::parse_command("device USB Mic (2)"),
            Some(ControlMessage::SelectDevice("USB Mic (2)".to_string()))
        );
        assert_eq!(ControlMessage::parse_command("devices"), Some(ControlMessage::ListDevices));
        assert_eq!(ControlMessage::parse_command("ports"), Some(ControlMessage::ListMidiPorts));
        assert_eq!(ControlMessage::parse_command("quit"), Some(ControlMessage::Quit));
        assert_eq!(ControlMessage::parse_command("   "), None);
    }
}
