use anyhow::Result;
use rand::seq::SliceRandom;
use thirtyfour::{DesiredCapabilities, WebDriver};

/// A small pool of WebDriver sessions. Fetches against independent target
/// domains pick a session at random, which is what bounds concurrent page
/// loads per session.
pub struct Droid {
    pub drivers: Vec<WebDriver>,
}

impl Droid {
    pub async fn new(webdriver_url: &str, pool_size: usize) -> Result<Self> {
        let mut drivers = Vec::with_capacity(pool_size);
        for _ in 0..pool_size.max(1) {
            let caps = DesiredCapabilities::chrome();
            let driver = WebDriver::new(webdriver_url, caps).await?;
            driver.maximize_window().await?;
            drivers.push(driver);
        }

        Ok(Droid { drivers })
    }

    pub fn pick(&self) -> &WebDriver {
        self.drivers
            .choose(&mut rand::thread_rng())
            .expect("driver pool is never empty")
    }

    pub async fn quit(self) {
        for driver in self.drivers {
            if let Err(e) = driver.quit().await {
                log::warn!("Error closing WebDriver session: {:?}", e);
            }
        }
    }
}
