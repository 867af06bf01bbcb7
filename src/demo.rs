//! In-memory collaborators for the built-in demonstration run.
//!
//! Every batch yields two photos and the same well-formed listing; the
//! publisher can be told to hit a captcha on one batch.

use serde_json::Value;

use crate::error::CollaboratorError;
use crate::pipeline::{ContentGenerator, PhotoSet, PhotoSource, PublishOutcome, Publisher};
use crate::schema::{AiResult, AvitoFields, Equipment, Specs, Transmission};

pub fn demo_batches(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("batch_{i}")).collect()
}

pub struct DemoPhotos;

impl PhotoSource for DemoPhotos {
    async fn import(&self, batch_id: &str) -> Result<PhotoSet, CollaboratorError> {
        Ok(PhotoSet {
            photo_files: vec![
                format!("data/{batch_id}/01.jpg"),
                format!("data/{batch_id}/02.jpg"),
            ],
            photo_urls: vec![
                format!("https://photo/{batch_id}/01.jpg"),
                format!("https://photo/{batch_id}/02.jpg"),
            ],
        })
    }
}

pub struct DemoGenerator;

impl DemoGenerator {
    pub fn listing() -> AiResult {
        AiResult {
            title: "Hyundai Solaris 1.6 AT, 2020".into(),
            description: "Автомобиль в отличном техническом состоянии, один владелец, \
                          обслуживание строго по регламенту у официального дилера. \
                          Не бит, не крашен, все ключи и документы в наличии. \
                          Зимняя резина в подарок, возможен обмен и кредит."
                .into(),
            specs: Specs {
                year: 2020,
                transmission: Transmission::Automatic,
                engine: "1.6 бензин".into(),
                horsepower: 123,
                mileage_km: 54_000,
            },
            equipment: Equipment {
                comfort: vec!["Кондиционер".into(), "Подогрев сидений".into()],
                interior: vec!["Ткань".into()],
                security: vec!["Иммобилайзер".into()],
                exterior: vec!["Литые диски".into()],
                assist: vec![],
                visibility: vec!["Датчик света".into()],
                safety: vec!["ABS".into(), "ESP".into()],
                multimedia: vec!["Bluetooth".into()],
            },
            avito_fields: AvitoFields {
                category: "Автомобили".into(),
                brand: "Hyundai".into(),
                model: "Solaris".into(),
                price_rub: 1_390_000,
                city: "Москва".into(),
                body_type: "Седан".into(),
                drive_type: "Передний".into(),
                color: "Белый".into(),
                owners: 1,
                payment_per_month_rub: 18_500,
            },
        }
    }
}

impl ContentGenerator for DemoGenerator {
    async fn generate(
        &self,
        _photo_files: &[String],
        _template_id: &str,
    ) -> Result<Value, CollaboratorError> {
        Ok(Self::listing().to_value())
    }
}

/// Posts everything except the batch configured to hit a captcha.
#[derive(Default)]
pub struct DemoPublisher {
    captcha_batch: Option<String>,
}

impl DemoPublisher {
    pub fn with_captcha_on(batch_id: &str) -> Self {
        Self {
            captcha_batch: Some(batch_id.to_string()),
        }
    }
}

impl Publisher for DemoPublisher {
    async fn publish(
        &self,
        _mapped: &Value,
        photo_files: &[String],
    ) -> Result<PublishOutcome, CollaboratorError> {
        // Photo paths look like data/<batch>/01.jpg.
        let batch = photo_files
            .first()
            .and_then(|p| p.split('/').nth(1))
            .unwrap_or_default();
        if self.captcha_batch.as_deref() == Some(batch) {
            return Ok(PublishOutcome::NeedAction {
                reason: "Captcha required".into(),
            });
        }
        Ok(PublishOutcome::Posted {
            post_url: format!("https://www.avito.ru/item/{batch}"),
        })
    }
}
