//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements          | Connects to               |
//! |-----------------|---------------------|---------------------------|
//! | `device_id`     |:                   | eFuse factory MAC         |
//! | `log_sink`      | EventSink           | Serial log output         |
//! | `mqtt`          | BrokerConnector     | MQTT 3.1.1 broker         |
//! |                 | BrokerConnection    |                           |
//! | `nvs`           | ConfigPort          | NVS / in-memory store     |
//! |                 | StoragePort         |                           |
//! | `tcp_transport` | TransportConnector  | lwIP / std TCP sockets    |
//! |                 | Transport           |                           |
//! | `time`          | DelayNs             | FreeRTOS task delay       |
//! | `wifi`          | LinkPort            | ESP-IDF WiFi STA          |

pub mod device_id;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod tcp_transport;
pub mod time;
pub mod wifi;
