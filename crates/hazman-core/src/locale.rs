//! Display strings for the dashboard, keyed by [`Text`].

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Pt,
    En,
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::Pt => f.write_str("pt"),
            Locale::En => f.write_str("en"),
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pt" | "pt-pt" | "pt-br" => Ok(Locale::Pt),
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            other => Err(format!("unsupported locale '{other}' (expected pt or en)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    Location,
    Coordinates,
    Sunset,
    HebrewDate,
    Parashah,
    Torah,
    Haftarah,
    CheckSefer,
    ShabbatIn,
    ShabbatShalom,
    Havdalah,
    CurrentHoliday,
    NoHolidayToday,
    NextHoliday,
    NoHolidays,
    CheckCalendar,
    UnknownLocation,
    SourceGps,
    SourceSearch,
    SourceSaved,
    SourceDefault,
    ErrorTitle,
    RetryHint,
    ErrGpsDenied,
    ErrGpsUnavailable,
    ErrTimeout,
    ErrNetwork,
    ErrCityNotFound,
    ErrSearchEmpty,
    ErrServiceUnavailable,
    ErrGeneric,
}

impl Locale {
    pub fn text(self, key: Text) -> &'static str {
        match self {
            Locale::Pt => pt(key),
            Locale::En => en(key),
        }
    }

    /// Day and month name, e.g. `10 Janeiro` / `10 January`.
    pub fn day_month(self, date: NaiveDate) -> String {
        let month = match self {
            Locale::Pt => PT_MONTHS[date.month0() as usize],
            Locale::En => EN_MONTHS[date.month0() as usize],
        };
        format!("{} {}", date.day(), month)
    }
}

const PT_MONTHS: [&str; 12] = [
    "Janeiro", "Fevereiro", "Março", "Abril", "Maio", "Junho", "Julho", "Agosto", "Setembro",
    "Outubro", "Novembro", "Dezembro",
];

const EN_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn pt(key: Text) -> &'static str {
    match key {
        Text::Location => "Local Atual",
        Text::Coordinates => "Coordenadas",
        Text::Sunset => "Sol Poente",
        Text::HebrewDate => "Ano Judaico",
        Text::Parashah => "Leitura da Semana",
        Text::Torah => "Porção Torá",
        Text::Haftarah => "Porção Haftará",
        Text::CheckSefer => "Verificar Sefer",
        Text::ShabbatIn => "Repouso Santo",
        Text::ShabbatShalom => "Shabbat Shalom",
        Text::Havdalah => "Havdalá",
        Text::CurrentHoliday => "Festa Atual",
        Text::NoHolidayToday => "Sem Festividade",
        Text::NextHoliday => "Próxima Festa",
        Text::NoHolidays => "Nenhuma festividade próxima",
        Text::CheckCalendar => "Consulte o calendário completo",
        Text::UnknownLocation => "Onde estás?",
        Text::SourceGps => "Tua Localização",
        Text::SourceSearch => "Local Escolhido",
        Text::SourceSaved => "Último Local",
        Text::SourceDefault => "Local Padrão",
        Text::ErrorTitle => "Algo não correu bem...",
        Text::RetryHint => "Enter para tentar de novo, escreve uma cidade ou 'q' para sair.",
        Text::ErrGpsDenied => {
            "Precisamos da tua permissão para saber onde estás e mostrar o horário certo."
        }
        Text::ErrGpsUnavailable => "Não conseguimos encontrar a tua localização agora.",
        Text::ErrTimeout => "A resposta demorou demasiado.",
        Text::ErrNetwork => "Parece que estás sem conexão. Verifica o Wi-Fi!",
        Text::ErrCityNotFound => "Não encontrámos essa cidade. Verifica o nome!",
        Text::ErrSearchEmpty => "Escreve o nome de uma cidade para pesquisar!",
        Text::ErrServiceUnavailable => {
            "O serviço está a descansar um pouco. Tenta daqui a segundos!"
        }
        Text::ErrGeneric => "Aconteceu algo inesperado. Tenta outra vez!",
    }
}

fn en(key: Text) -> &'static str {
    match key {
        Text::Location => "Current Location",
        Text::Coordinates => "Coordinates",
        Text::Sunset => "Sunset",
        Text::HebrewDate => "Hebrew Date",
        Text::Parashah => "Weekly Portion",
        Text::Torah => "Torah Portion",
        Text::Haftarah => "Haftarah Portion",
        Text::CheckSefer => "Check the Sefer",
        Text::ShabbatIn => "Shabbat In",
        Text::ShabbatShalom => "Shabbat Shalom",
        Text::Havdalah => "Havdalah",
        Text::CurrentHoliday => "Current Holiday",
        Text::NoHolidayToday => "No holiday today",
        Text::NextHoliday => "Next Holiday",
        Text::NoHolidays => "No upcoming holidays",
        Text::CheckCalendar => "Check the full calendar",
        Text::UnknownLocation => "Unknown location",
        Text::SourceGps => "Your Location",
        Text::SourceSearch => "Selected Location",
        Text::SourceSaved => "Last Location",
        Text::SourceDefault => "Default Location",
        Text::ErrorTitle => "Something went wrong...",
        Text::RetryHint => "Press Enter to retry, type a city to search, or 'q' to quit.",
        Text::ErrGpsDenied => "We need your permission to know where you are.",
        Text::ErrGpsUnavailable => "We could not find your location right now.",
        Text::ErrTimeout => "The request took too long.",
        Text::ErrNetwork => "You seem to be offline. Check your connection!",
        Text::ErrCityNotFound => "We could not find that city. Check the name!",
        Text::ErrSearchEmpty => "Type a city name to search!",
        Text::ErrServiceUnavailable => "The service is resting. Try again in a few seconds!",
        Text::ErrGeneric => "Something unexpected happened. Try again!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locale_codes() {
        assert_eq!("PT".parse::<Locale>(), Ok(Locale::Pt));
        assert_eq!("en-GB".parse::<Locale>(), Ok(Locale::En));
        assert!("he".parse::<Locale>().is_err());
    }

    #[test]
    fn day_month_uses_locale_month_names() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 15).unwrap();
        assert_eq!(Locale::Pt.day_month(date), "15 Abril");
        assert_eq!(Locale::En.day_month(date), "15 April");
    }
}
