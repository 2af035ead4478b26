//! 驱动层错误类型定义

use rplidar_protocol::ProtocolError;
use rplidar_transport::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 命令通道已关闭（IO 线程退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 命令通道已满
    #[error("Command channel full (buffer size: {0})")]
    ChannelFull(usize),

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 等待应答超时（命令可能已经生效）
    #[error("Operation timeout")]
    Timeout,

    /// 收到的应答与命令不匹配
    #[error("Unexpected response: expected type 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedResponse { expected: u8, actual: u8 },

    /// 该命令没有应答，无法等待
    #[error("Command 0x{0:02X} has no response")]
    NoResponse(u8),

    /// 配置非法
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use rplidar_protocol::ProtocolError;
    use rplidar_transport::TransportError;

    #[test]
    fn test_driver_error_display() {
        let driver_error = DriverError::Transport(TransportError::Closed);
        let msg = format!("{}", driver_error);
        assert!(msg.contains("Transport closed"), "Transport error message: {}", msg);

        let protocol_error = ProtocolError::InvalidLength {
            kind: "Measurement",
            expected: 5,
            actual: 4,
        };
        let msg = format!("{}", DriverError::Protocol(protocol_error));
        assert!(msg.contains("Invalid payload length"), "Protocol error message: {}", msg);

        assert_eq!(format!("{}", DriverError::ChannelClosed), "Command channel closed");
        assert!(format!("{}", DriverError::ChannelFull(16)).contains("16"));
        assert!(format!("{}", DriverError::PoisonedLock).contains("Poisoned lock"));

        let msg = format!("{}", DriverError::IoThread("test error".to_string()));
        assert!(msg.contains("IO thread") && msg.contains("test error"));

        assert_eq!(format!("{}", DriverError::Timeout), "Operation timeout");

        let msg = format!(
            "{}",
            DriverError::UnexpectedResponse {
                expected: 0x04,
                actual: 0x06
            }
        );
        assert!(msg.contains("0x04") && msg.contains("0x06"));

        assert_eq!(
            format!("{}", DriverError::NoResponse(0x25)),
            "Command 0x25 has no response"
        );

        let msg = format!("{}", DriverError::InvalidConfig("sector width".to_string()));
        assert!(msg.contains("sector width"));
    }

    #[test]
    fn test_from_transport_error() {
        let driver_error: DriverError = TransportError::Timeout.into();
        match driver_error {
            DriverError::Transport(e) => assert!(matches!(e, TransportError::Timeout)),
            _ => panic!("Expected Transport variant"),
        }
    }

    #[test]
    fn test_from_protocol_error() {
        let protocol_error = ProtocolError::ChecksumMismatch {
            expected: 0x12,
            actual: 0x34,
        };
        let driver_error: DriverError = protocol_error.into();
        match driver_error {
            DriverError::Protocol(ProtocolError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, 0x12);
                assert_eq!(actual, 0x34);
            },
            _ => panic!("Expected Protocol variant"),
        }
    }
}
