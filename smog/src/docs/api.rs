/*!
# Smog API documentation

This page describes the API endpoints available on Smog.

## Cities

Endpoint: `/api/v1/cities`

Example: `/api/v1/cities?country=PL&page=2`

Lists the cities of a country, most polluted first, with a short description
of each city.

### Query Parameters

- `country` - Required. The country to list cities for, passed as-is to the
  pollution API. A missing or blank value is answered with a `400`.
- `page` - Optional, defaults to `1`. Leading digits are read, so `2abc` is
  page 2. Unreadable, zero and negative values are page 1. A page past the end
  of the list is answered with the first page's cities.

### Response

```json
{
  "total": 25,
  "limit": 10,
  "page": 1,
  "cities": [
    {
      "name": "krakow",
      "pollution": 87.5,
      "description": "Kraków is the second-largest city in Poland."
    }
  ]
}
```

- `total` - the number of cities of the country.
- `limit` - the page size.
- `page` - the page that was requested.
- `cities` - the cities on this page. `name` is the normalized name: lower
  case, without diacritics. `description` is `null` if Wikipedia could not be
  reached, and `"Description not available."` if the article has no summary.

The `X-Cache` header is `hit` if the country's list was already built, and
`miss` if it was built for this request. The first request for a country is
slow, since every listing page and every description lookup is rate limited.

Errors are answered as `{"error": "..."}`.

## Dockerflow

- `/__lbheartbeat__` - an empty `200`, for load balancers.
- `/__heartbeat__` - the running version, as JSON.
- `/__version__` - the contents of `version.json`.
- `/__error__` - a test `500`, only when `debug` is set.
*/
