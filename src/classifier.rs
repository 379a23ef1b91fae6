use crate::config::{Config, MarkerPolarity};

/// How an origin response resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The origin showed its own outage banner; retry later.
    TransientError,
    /// The domain is free for registration.
    Available,
    /// The domain is registered; the page should carry a WHOIS table.
    Occupied,
    /// Nothing we recognize. Callers treat this like `Available`.
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    transient_banner: String,
    occupancy_marker: String,
    polarity: MarkerPolarity,
}

impl ResponseClassifier {
    pub fn new(
        transient_banner: impl Into<String>,
        occupancy_marker: impl Into<String>,
        polarity: MarkerPolarity,
    ) -> Self {
        Self {
            transient_banner: transient_banner.into(),
            occupancy_marker: occupancy_marker.into(),
            polarity,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.transient_banner.clone(),
            config.occupancy_marker.clone(),
            config.marker_polarity,
        )
    }

    pub fn transient_banner(&self) -> &str {
        &self.transient_banner
    }

    /// Rules apply in order: outage banner, then the occupancy marker read
    /// with the configured polarity, then the HTTP status.
    pub fn classify(&self, http_status: u16, body: &str) -> Classification {
        if body.contains(self.transient_banner.as_str()) {
            return Classification::TransientError;
        }

        let marker_present = body.contains(self.occupancy_marker.as_str());

        match self.polarity {
            MarkerPolarity::Available => {
                if marker_present {
                    Classification::Available
                } else if http_status == 200 {
                    Classification::Occupied
                } else {
                    Classification::Unrecognized
                }
            }
            MarkerPolarity::Occupied => {
                if http_status != 200 {
                    Classification::Unrecognized
                } else if marker_present {
                    Classification::Occupied
                } else {
                    Classification::Available
                }
            }
        }
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
