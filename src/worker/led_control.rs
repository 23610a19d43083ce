//! Bridges the worker's `MqttController` to `streaming::server::LedControl`
//! (spec §4.2 `/led` route, §4.5 step 9 LED auto-control) so the HTTP layer
//! never needs to know about MQTT directly.

use std::sync::Arc;

use crate::error::Result;
use crate::mqtt::MqttController;
use crate::streaming::LedControl;

pub struct MqttLedControl {
    pub controller: Arc<MqttController>,
}

#[async_trait::async_trait]
impl LedControl for MqttLedControl {
    async fn get_led(&self) -> (bool, Option<u32>) {
        self.controller.query_led_status().await.unwrap_or((false, None))
    }

    async fn set_led(&self, on: bool, brightness: Option<u32>) -> Result<()> {
        self.controller.set_led(on, brightness).await
    }
}
